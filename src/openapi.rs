use crate::handlers;
use crate::models::*;
use crate::simulator::{SimulationRequest, SimulationResult};
use crate::{solbot_handler, token_handler};
use axum::{http::StatusCode, response::IntoResponse, Json};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Solar Credit API",
        description = "Credit scoring from energy bills and open finance, energy-token ledger and the SolBot matching assistant"
    ),
    paths(
        handlers::create_energy_bill,
        handlers::analyze_energy_bill,
        handlers::create_open_finance_connection,
        handlers::connect_open_finance,
        handlers::get_credit_analysis,
        handlers::get_credit_analysis_history,
        handlers::get_my_roles,
        handlers::update_profile,
        handlers::get_current_term,
        handlers::sign_term,
        handlers::run_simulation,
        token_handler::list_marketplace,
        token_handler::list_my_tokens,
        token_handler::mint_token,
        token_handler::validate_transfer,
        token_handler::transfer_token,
        token_handler::burn_token,
        token_handler::list_transactions,
        token_handler::list_purchases,
        solbot_handler::solbot_chat,
    ),
    components(schemas(
        BillStatus,
        ConnectionStatus,
        CreditStatus,
        TokenStatus,
        TransactionType,
        AppRole,
        TermStatus,
        EnergyBill,
        FinancialConnection,
        EnergyToken,
        TokenTransaction,
        Profile,
        CooperativeTerm,
        CreateBillRequest,
        AnalyzeBillRequest,
        CreateConnectionRequest,
        ConnectOpenFinanceRequest,
        CreditAnalysisResponse,
        CreditAnalysisView,
        RecipientRef,
        TransferRequest,
        TransferMode,
        TransferResponse,
        AmountRequest,
        ValidateTransferResponse,
        MintTokenRequest,
        MintTokenResponse,
        BurnResponse,
        MarketplaceSort,
        PurchasesResponse,
        ChatRole,
        ChatMessage,
        ChatTurn,
        ChatRequest,
        SignTermRequest,
        UpdateProfileRequest,
        RolesResponse,
        SimulationRequest,
        SimulationResult,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "credit", description = "Credit analysis"),
        (name = "tokens", description = "Energy-token marketplace and ledger"),
        (name = "solbot", description = "Generator matching assistant"),
        (name = "cooperative", description = "Cooperative adhesion term"),
        (name = "profile", description = "Profile and roles"),
        (name = "simulator", description = "Savings simulator")
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

/// Serves the generated OpenAPI document.
pub async fn serve_openapi_spec() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

/// Serves the Swagger UI page, pointed at [`serve_openapi_spec`].
pub async fn serve_swagger_ui() -> impl IntoResponse {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Solar Credit API - Swagger UI</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
    <style>
        body { margin: 0; padding: 0; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = function() {
            window.ui = SwaggerUIBundle({
                url: "/api-docs/openapi.json",
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            });
        };
    </script>
</body>
</html>
"#;
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_document_lists_routes() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let paths = doc["paths"].as_object().unwrap();
        for path in [
            "/api/v1/analyze-energy-bill",
            "/api/v1/connect-open-finance",
            "/api/v1/tokens/{id}/transfer",
            "/api/v1/solbot",
        ] {
            assert!(paths.contains_key(path), "missing {}", path);
        }
        assert!(doc["components"]["securitySchemes"]["bearer_auth"].is_object());
    }

    #[test]
    fn test_marketplace_documents_sort_parameter() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let params = doc["paths"]["/api/v1/tokens"]["get"]["parameters"]
            .as_array()
            .unwrap();
        let sort = params
            .iter()
            .find(|p| p["name"] == "sort")
            .expect("sort parameter documented");
        assert_eq!(sort["in"], "query");
        assert!(doc["components"]["schemas"]["ChatTurn"].is_object());
    }
}
