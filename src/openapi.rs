use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::errors::ErrorResponse;
use crate::services::payments::{
    ConfirmPaymentInput, ConfirmPaymentResult, CreatePaymentIntentInput, PaymentIntentResponse,
};
use crate::services::products::Pagination;

/// OpenAPI document. Coverage is focused on the payment surface; the rest
/// of the API follows the same envelope conventions.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Matchable API",
        description = "Storefront backend: sessions, bookings, cart, orders and payments"
    ),
    paths(
        crate::handlers::payments::create_intent,
        crate::handlers::payments::confirm_payment,
    ),
    components(schemas(
        ErrorResponse,
        Pagination,
        CreatePaymentIntentInput,
        ConfirmPaymentInput,
        ConfirmPaymentResult,
        PaymentIntentResponse,
    )),
    tags(
        (name = "Payments", description = "Payment intents, confirmation and webhooks")
    )
)]
pub struct ApiDoc;

/// Swagger UI mounted at `/docs`.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
