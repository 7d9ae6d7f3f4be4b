mod handlers;
mod middleware;
mod models;
mod services;
mod utils;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::sync::Arc;

use crate::middleware::auth::JwtMiddleware;
use services::storage::{FileStore, LocalFileStore};
use utils::{
    config::Config,
    db::{establish_connection, seed_public_traits, sync_schema},
};

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", context, e);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file FIRST before anything else
    dotenv::dotenv().ok();

    // Initialize logger with default level if RUST_LOG not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=================================================");
    println!("🚀 habitcal Backend Server");
    println!("=================================================");

    // Load configuration
    let config =
        Config::from_env().map_err(|e| startup_error("Failed to load configuration", e))?;
    let host = config.host.clone();
    let port = config.port;

    println!("📝 Configuration loaded:");
    println!(
        "   - Database: {}",
        config.database_url.split('@').last().unwrap_or("***")
    );
    println!("   - Host: {}", host);
    println!("   - Port: {}", port);
    println!(
        "   - Registration: {}",
        if config.allow_registration {
            "ENABLED"
        } else {
            "DISABLED"
        }
    );
    println!("   - Storage: {}", config.storage_dir);
    println!(
        "   - Log level: {}",
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
    );

    // Establish database connection
    print!("🔌 Connecting to database... ");
    let db = establish_connection(&config.database_url)
        .await
        .map_err(|e| startup_error("Failed to connect to database", e))?;
    println!("✅ Connected!");

    log::info!("Database connection established");

    sync_schema(&db)
        .await
        .map_err(|e| startup_error("Failed to create schema", e))?;
    seed_public_traits(&db)
        .await
        .map_err(|e| startup_error("Failed to seed public traits", e))?;

    let local_store = LocalFileStore::new(&config.storage_dir, config.max_upload_bytes);
    tokio::fs::create_dir_all(local_store.root()).await?;
    log::info!("File store ready at {}", local_store.root().display());
    let store: Arc<dyn FileStore> = Arc::new(local_store);

    // Start HTTP server
    println!("🌐 Starting HTTP server at http://{}:{}", host, port);
    println!("📍 Available endpoints:");
    println!("   - POST http://{}:{}/auth/register", host, port);
    println!("   - POST http://{}:{}/auth/login", host, port);
    println!("   - GET  http://{}:{}/habits (JWT required)", host, port);
    println!("   - GET  http://{}:{}/occurrences (JWT required)", host, port);
    println!("   - GET  http://{}:{}/notes (JWT required)", host, port);
    println!(
        "   - GET  http://{}:{}/calendar/month (JWT required)",
        host, port
    );
    println!("   - GET  http://{}:{}/stats (JWT required)", host, port);
    println!("=================================================");

    log::info!("Server started at http://{}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://localhost:3000")
            .allowed_origin(&config.frontend_url)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::ACCEPT,
                actix_web::http::header::CONTENT_TYPE,
            ])
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(db.clone()))
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::from(store.clone()))
            .app_data(web::PayloadConfig::new(config.max_upload_bytes))
            .wrap(Logger::default())
            .wrap(cors) // CORS must be wrapped AFTER Logger to ensure headers are added to all responses
            // Public endpoints (no authentication required)
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(handlers::auth::register))
                    .route("/login", web::post().to(handlers::auth::login))
                    .route(
                        "/refresh",
                        web::post()
                            .to(handlers::auth::refresh)
                            .wrap(JwtMiddleware),
                    ),
            )
            // Protected endpoints (JWT required)
            .service(
                web::scope("/account")
                    .wrap(JwtMiddleware)
                    .route("", web::get().to(handlers::account::get_account))
                    .route("", web::put().to(handlers::account::update_account)),
            )
            .service(
                web::scope("/traits")
                    .wrap(JwtMiddleware)
                    .route("", web::get().to(handlers::traits::list_traits))
                    .route("", web::post().to(handlers::traits::create_trait))
                    .route("/{id}", web::get().to(handlers::traits::get_trait))
                    .route("/{id}", web::put().to(handlers::traits::update_trait))
                    .route("/{id}", web::delete().to(handlers::traits::delete_trait)),
            )
            .service(
                web::scope("/habits")
                    .wrap(JwtMiddleware)
                    .route("", web::get().to(handlers::habits::list_habits))
                    .route("", web::post().to(handlers::habits::create_habit))
                    .route("/{id}", web::get().to(handlers::habits::get_habit))
                    .route("/{id}", web::put().to(handlers::habits::update_habit))
                    .route("/{id}", web::delete().to(handlers::habits::delete_habit))
                    .route("/{id}/icon", web::put().to(handlers::habits::upload_icon))
                    .route("/{id}/icon", web::delete().to(handlers::habits::delete_icon))
                    .route("/{id}/stats", web::get().to(handlers::stats::habit_stats)),
            )
            .service(
                web::scope("/occurrences")
                    .wrap(JwtMiddleware)
                    .route(
                        "",
                        web::get().to(handlers::occurrences::list_occurrences),
                    )
                    .route(
                        "",
                        web::post().to(handlers::occurrences::create_occurrence),
                    )
                    .route(
                        "/{id}",
                        web::get().to(handlers::occurrences::get_occurrence),
                    )
                    .route(
                        "/{id}",
                        web::put().to(handlers::occurrences::update_occurrence),
                    )
                    .route(
                        "/{id}",
                        web::delete().to(handlers::occurrences::delete_occurrence),
                    )
                    .route(
                        "/{id}/photos",
                        web::post().to(handlers::occurrences::upload_photo),
                    )
                    .route(
                        "/{id}/photos",
                        web::delete().to(handlers::occurrences::delete_photo),
                    ),
            )
            .service(
                web::scope("/notes")
                    .wrap(JwtMiddleware)
                    .route("", web::get().to(handlers::notes::list_notes))
                    .route("", web::post().to(handlers::notes::create_note))
                    .route("/{id}", web::get().to(handlers::notes::get_note))
                    .route("/{id}", web::put().to(handlers::notes::update_note))
                    .route("/{id}", web::delete().to(handlers::notes::delete_note)),
            )
            // Calendar views; the fixed paths must come before /{view}
            .service(
                web::scope("/calendar")
                    .wrap(JwtMiddleware)
                    .route("/range", web::get().to(handlers::calendar::get_range))
                    .route("/iso-week", web::get().to(handlers::calendar::get_iso_week))
                    .route("/{view}", web::get().to(handlers::calendar::get_view))
                    .route("/{view}/{year}", web::get().to(handlers::calendar::get_view))
                    .route(
                        "/{view}/{year}/{month}",
                        web::get().to(handlers::calendar::get_view),
                    )
                    .route(
                        "/{view}/{year}/{month}/{day}",
                        web::get().to(handlers::calendar::get_view),
                    ),
            )
            .service(
                web::scope("/stats")
                    .wrap(JwtMiddleware)
                    .route("", web::get().to(handlers::stats::overview)),
            )
            // Stored icons and photos, visible to their owner only
            .service(
                web::scope("/files")
                    .wrap(JwtMiddleware)
                    .route(
                        "/{bucket}/{user_id}/{filename}",
                        web::get().to(handlers::files::serve_file),
                    ),
            )
    })
    .bind((host, port))?
    .run()
    .await
}
