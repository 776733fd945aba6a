//! Backend crate for the trip planner web site.
//!
//! Uses actix to serve the site's static files and the flight search API, proxying searches
//! to the flight offers provider and picking the best offer for the booking pages.

pub mod config;
pub mod flight_api;
pub mod web_app;

use actix_files::Files;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::{fs, io};
use trip_planner_shared::airports::AirportDirectory;

use crate::config::Config;
use crate::flight_api::{AmadeusApiQuery, MockOfferSource, OfferSource};
use crate::web_app::AppState;

fn offer_source(config: &Config) -> io::Result<Box<dyn OfferSource>> {
    if config.amadeus.credentials().is_some() {
        let api = AmadeusApiQuery::new(&config.amadeus)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        log::info!("Using Amadeus flight offers at {}", config.amadeus.base_url);
        return Ok(Box::new(api));
    }

    log::warn!(
        "No API_KEY/API_SECRET configured, serving mock offers from {}",
        config.data.mock_offers_path
    );
    let mock = MockOfferSource::from_path(&config.data.mock_offers_path)
        .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))?;
    Ok(Box::new(mock))
}

fn airport_directory(path: &str) -> AirportDirectory {
    let loaded = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|json| AirportDirectory::from_json_str(&json).map_err(|e| e.to_string()));

    match loaded {
        Ok(dir) => {
            log::info!("Loaded {} airports from {}", dir.len(), path);
            dir
        }
        Err(e) => {
            log::warn!("Airport data unavailable ({}): {}", path, e);
            AirportDirectory::new()
        }
    }
}

fn static_files(dir: &str) -> Files {
    Files::new("/", dir).index_file("index.html")
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config =
        Config::load().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let state = web::Data::new(AppState {
        offers: offer_source(&config)?,
        airports: airport_directory(&config.data.airports_path),
    });

    let static_dir = config.server.static_dir.clone();
    log::info!(
        "Server running at http://{}:{}, static files from {}",
        config.server.host,
        config.server.port,
        static_dir
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(web_app::configure)
            .service(static_files(&static_dir))
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}

#[cfg(test)]
mod main_tests {
    use super::{airport_directory, offer_source, static_files};
    use crate::config::{AmadeusConfig, Config, DataConfig, ServerConfig};
    use crate::flight_api::OfferSource;
    use actix_web::{http::StatusCode, test, App};
    use trip_planner_shared::queries::{Date, FlightSearchQuery};

    fn config(client_id: Option<&str>) -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                static_dir: concat!(env!("CARGO_MANIFEST_DIR"), "/public").to_string(),
            },
            amadeus: AmadeusConfig {
                base_url: "http://127.0.0.1:9".to_string(),
                client_id: client_id.map(str::to_string),
                client_secret: Some("secret".to_string()),
                max_retries: 0,
                retry_delay_ms: 0,
            },
            data: DataConfig {
                airports_path: concat!(env!("CARGO_MANIFEST_DIR"), "/test/airports.json")
                    .to_string(),
                mock_offers_path: concat!(env!("CARGO_MANIFEST_DIR"), "/test/MockFlightOffers.csv")
                    .to_string(),
            },
        }
    }

    #[core::prelude::v1::test]
    fn test_airport_directory_from_file() {
        let dir = airport_directory(&config(None).data.airports_path);

        assert!(!dir.is_empty());
        assert_eq!(dir.label("mad"), "MAD - Madrid");
    }

    #[core::prelude::v1::test]
    fn test_airport_directory_missing_file() {
        assert!(airport_directory("JSON/nowhere.json").is_empty());
    }

    #[tokio::test]
    async fn test_mock_source_without_credentials() {
        let source = offer_source(&config(None)).unwrap();
        let query =
            FlightSearchQuery::new("LIS", "LIM", Date::from_ymd_opt(2024, 11, 3).unwrap()).unwrap();

        let offers = source.search(&query).await.unwrap();
        assert_eq!(offers.len(), 5);
    }

    #[core::prelude::v1::test]
    fn test_amadeus_source_with_credentials() {
        assert!(offer_source(&config(Some("key"))).is_ok());

        let mut broken = config(None);
        broken.data.mock_offers_path = "test/missing.csv".to_string();
        assert!(offer_source(&broken).is_err());
    }

    #[actix_web::test]
    async fn test_static_files_hide_config() {
        let config = config(None);
        assert!(config
            .server
            .check_static_dir(concat!(env!("CARGO_MANIFEST_DIR"), "/config"))
            .is_ok());

        let app =
            test::init_service(App::new().service(static_files(&config.server.static_dir))).await;

        let req = test::TestRequest::get().uri("/index.html").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        for uri in ["/config/default.toml", "/Cargo.toml", "/src/main.rs"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            assert_eq!(
                test::call_service(&app, req).await.status(),
                StatusCode::NOT_FOUND,
                "{}",
                uri
            );
        }
    }
}
