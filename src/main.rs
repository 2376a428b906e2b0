use clipstream_auth::{Config, build_rocket};
use rocket::figment::providers::Serialized;

#[rocket::launch]
fn rocket() -> _ {
    dotenvy::dotenv().ok();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {}", err);
            std::process::exit(1);
        }
    };

    let address = config.server.address.clone();
    let port = config.server.port;

    build_rocket(config).configure(
        rocket::Config::figment()
            .merge(Serialized::default("address", address))
            .merge(Serialized::default("port", port)),
    )
}
