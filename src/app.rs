use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{SessionError, SessionIssuer};
use crate::config::AppConfig;
use crate::database::{DatabaseManager, Stores};
use crate::handlers::{elevated, protected, public};
use crate::middleware::jwt_auth_middleware;
use crate::otp::{OtpLedger, OtpStore};
use crate::phone::PhoneNormalizer;
use crate::policy::AccessPolicy;
use crate::sms::SmsGateway;
use crate::storage::ObjectStorage;

/// Collaborators shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub normalizer: Arc<PhoneNormalizer>,
    pub otp: Arc<OtpLedger>,
    pub sessions: Arc<SessionIssuer>,
    pub policy: AccessPolicy,
    pub stores: Stores,
    pub storage: Arc<dyn ObjectStorage>,
    pub database: Option<DatabaseManager>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        otp_store: Arc<dyn OtpStore>,
        sms: Arc<dyn SmsGateway>,
        stores: Stores,
        storage: Arc<dyn ObjectStorage>,
    ) -> Result<Self, SessionError> {
        let sessions = SessionIssuer::from_config(&config.security)?;
        let otp = OtpLedger::new(
            otp_store,
            sms,
            config.otp.clone(),
            Duration::from_secs(config.sms.timeout_secs),
        );

        Ok(Self {
            normalizer: Arc::new(PhoneNormalizer::from_config(&config.otp)),
            otp: Arc::new(otp),
            sessions: Arc::new(sessions),
            policy: AccessPolicy::new(),
            stores,
            storage,
            database: None,
            config: Arc::new(config),
        })
    }

    pub fn with_database(mut self, database: DatabaseManager) -> Self {
        self.database = Some(database);
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.api.max_upload_bytes;

    let router = Router::new()
        .merge(public_routes(upload_limit))
        .merge(protected_routes(state.clone()))
        .layer(CorsLayer::permissive());

    let router = if state.config.api.enable_request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    };
    router.with_state(state)
}

fn public_routes(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route("/health", get(public::health::health))
        // Field users
        .route("/send-otp", post(public::otp::send_otp))
        .route("/verify-otp", post(public::otp::verify_otp))
        .route("/register", post(public::registration::register))
        .route("/attendance", post(public::attendance::submit_attendance))
        .route(
            "/lessonplan/upload",
            post(public::lesson_plan::upload_lesson_plan).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // Dashboard onboarding and login
        .route(
            "/dashboard/send-registration-otp",
            post(public::dashboard::send_registration_otp),
        )
        .route(
            "/dashboard/verify-registration-otp",
            post(public::dashboard::verify_registration_otp),
        )
        .route("/dashboard/register", post(public::dashboard::register))
        .route("/dashboard/send-login-otp", post(public::dashboard::send_login_otp))
        .route("/dashboard/login", post(public::dashboard::login))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    let export_collection = post(protected::export_requests::create_export_request)
        .get(elevated::export_requests::list_export_requests);

    Router::new()
        .route("/registrations", get(protected::records::list_registrations))
        .route("/attendances", get(protected::records::list_attendances))
        .route("/users/:id", get(protected::records::get_user))
        .route("/lessonplans", get(protected::records::list_lesson_plans))
        .route("/dashboard/me", get(protected::dashboard::me))
        .route("/dashboard/export-requests", export_collection.clone())
        .route("/dashboard/export-requests/", export_collection)
        .route(
            "/dashboard/export-requests/user/:id",
            get(protected::export_requests::list_user_export_requests),
        )
        // SUPERADMIN only, enforced by the access policy in each handler
        .route(
            "/dashboard/export-requests/:id",
            patch(elevated::export_requests::update_export_request),
        )
        .route("/lessonplan/:id", delete(elevated::lesson_plan::delete_lesson_plan))
        .route_layer(middleware::from_fn_with_state(state, jwt_auth_middleware))
}
