mod config;
mod error;
mod handlers;
mod models;
mod services;

use actix_web::{middleware::Logger, web, App, HttpServer};
use actix_cors::Cors;
use dotenv::dotenv;
use std::env;

use services::{database::DatabaseService, email::EmailService, stripe::StripeService};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = config::Config::from_env().expect("Failed to load configuration");

    let database_service = DatabaseService::new(&config.database_url)
        .await
        .expect("Failed to initialize database");

    let stripe_service = StripeService::new(config.stripe.clone());
    let email_service = EmailService::new(&config.app);

    let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind_address = format!("0.0.0.0:{}", port);

    log::info!("Starting StudySphere API on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .supports_credentials(),
            )
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(database_service.clone()))
            .app_data(web::Data::new(stripe_service.clone()))
            .app_data(web::Data::new(email_service.clone()))
            .service(
                web::scope("/api/v1")
                    .service(
                        web::scope("/users")
                            .service(handlers::users::register_user)
                            .service(handlers::users::get_user),
                    )
                    .service(
                        web::scope("/subscriptions")
                            .service(handlers::subscriptions::create_checkout)
                            .service(handlers::subscriptions::get_current_subscription)
                            .service(handlers::subscriptions::cancel_subscription)
                            .service(handlers::subscriptions::get_payment_history),
                    )
                    .service(web::scope("/webhooks").service(handlers::webhooks::stripe_webhook))
                    .service(
                        web::scope("/contents")
                            .service(handlers::content::list_contents)
                            .service(handlers::content::create_content)
                            .service(handlers::content::get_content),
                    )
                    .route("/health", web::get().to(handlers::health::health_check)),
            )
    })
    .bind(&bind_address)?
    .run()
    .await
}
