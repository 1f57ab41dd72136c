//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{admin, books, health, loans, settings};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "BookLend API",
        version = "0.3.0",
        description = "Personal book lending tracker with email reminders"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Loans
        loans::list_active_loans,
        loans::create_loan,
        loans::return_loan,
        loans::loan_history,
        // Settings
        settings::get_notification_settings,
        settings::update_notification_settings,
        // Admin
        admin::get_stats,
        admin::run_reminders,
    ),
    components(
        schemas(
            // Books
            crate::models::book::Book,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            // Loans
            crate::models::loan::Loan,
            crate::models::loan::LoanDetails,
            crate::models::loan::CreateLoan,
            crate::models::book::BookShort,
            // Settings
            crate::models::settings::NotificationPreferences,
            crate::models::settings::UserSettings,
            crate::models::settings::UpdateUserSettings,
            // Admin
            admin::StatsResponse,
            crate::models::reminder::SweepReport,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "books", description = "Personal book collection"),
        (name = "loans", description = "Lending and returns"),
        (name = "settings", description = "Per-user notification settings"),
        (name = "admin", description = "Statistics and reminder control")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
