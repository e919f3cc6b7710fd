use actix_web::{web, Scope};
use log::info;

use super::{accounts, categories, emails, oauth};

pub fn configure_routes() -> Scope {
    web::scope("/api/v1")
        .service(
            web::scope("/auth")
                .route("/google-auth-url", web::get().to(oauth::google_auth_url))
                .route("/google/callback", web::get().to(oauth::google_callback))
                .route("/exchange-code", web::post().to(oauth::exchange_code))
                .route("/me", web::get().to(oauth::me)),
        )
        .service(
            web::scope("/categories")
                .route("", web::get().to(categories::list_categories))
                .route("", web::post().to(categories::create_category))
                .route("/{category_id}", web::get().to(categories::get_category))
                .route("/{category_id}", web::put().to(categories::update_category))
                .route("/{category_id}", web::delete().to(categories::delete_category)),
        )
        .service(
            web::scope("/emails")
                // Fixed segments before the id matcher.
                .route("/sync", web::post().to(emails::sync_all_accounts))
                .route("/bulk-delete", web::post().to(emails::bulk_delete))
                .route("", web::get().to(emails::list_emails))
                .route("/{email_id}", web::get().to(emails::get_email))
                .route("/{email_id}", web::put().to(emails::update_email))
                .route("/{email_id}", web::delete().to(emails::delete_email)),
        )
        .service(
            web::scope("/accounts")
                .route("", web::get().to(accounts::list_accounts))
                .route("/{account_id}", web::get().to(accounts::get_account))
                .route("/{account_id}", web::delete().to(accounts::delete_account))
                .route("/{account_id}/sync", web::post().to(accounts::sync_account)),
        )
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    info!("Configuring API routes (/api/v1)");
    cfg.service(configure_routes());
}
