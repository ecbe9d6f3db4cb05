#[macro_use]
extern crate rocket;

pub mod api;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod filters;
pub mod forms;
pub mod kpi;
pub mod models;
pub mod routes;
pub mod state;

use rocket::fs::{relative, FileServer};
use rocket::{Build, Rocket};
use rocket_dyn_templates::Template;

use crate::config::AppConfig;
use crate::state::Services;

/// Mount routes, templates and static files around the given services.
pub fn build(rocket: Rocket<Build>, services: Services) -> Rocket<Build> {
    rocket
        .attach(Template::fairing())
        .manage(services)
        .mount("/", routes::index_routes())
        .mount("/api", routes::api_routes())
        .mount("/static", FileServer::from(relative!("static")))
}

/// Rocket instance wired to the HTTP backend and identity provider named in
/// the configuration.
pub fn rocket() -> Rocket<Build> {
    let figment = rocket::Config::figment();
    let config = AppConfig::from_figment(&figment);
    let services = Services::from_config(&config);
    build(rocket::custom(figment), services).manage(config)
}
