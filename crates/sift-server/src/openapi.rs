use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sift API",
        version = "0.3.0",
        description = "Batch LLM extraction over uploaded files with credential rotation."
    ),
    paths(crate::routes::extract, crate::routes::health),
    components(schemas(
        crate::dto::ExtractForm,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "extract", description = "Batch extraction"),
        (name = "system", description = "Health and system status"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds Bearer token security scheme to the OpenAPI document.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("token")
                        .description(Some(
                            "Deployment token, only enforced when SIFT_SERVER_TOKEN is set.",
                        ))
                        .build(),
                ),
            );
        }
    }
}
