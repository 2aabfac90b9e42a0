//! The capabilities this gateway exposes, and what each one falls back to.

use relay_connectors::{HANDSHAKE_CAPABILITY, SYNC_CAPABILITY};
use relay_core::{
    echo_with_placeholder_id, CapabilityDef, CapabilityRegistry, FallbackProvider, HttpMethod,
    Role, Shape,
};
use serde_json::json;

fn metric() -> Shape {
    Shape::object([("label", Shape::String), ("value", Shape::Number)])
}

fn queued() -> Shape {
    Shape::object([("id", Shape::String), ("status", Shape::String)])
}

pub fn registry() -> CapabilityRegistry {
    CapabilityRegistry::new()
        .with(
            CapabilityDef::new("tenant.dashboard", HttpMethod::Get, "/tenants/{tenant_id}/dashboard")
                .timeout_ms(3_000)
                .requires_role(Role::Client)
                .requires_feature("dashboard")
                .shape(Shape::object([
                    ("widgets", Shape::array_of(metric())),
                    ("updated_at", Shape::nullable(Shape::String)),
                ])),
        )
        .with(
            CapabilityDef::new(
                "campaigns.metrics",
                HttpMethod::Get,
                "/tenants/{tenant_id}/campaigns/{campaign_id}/metrics",
            )
            .timeout_ms(5_000)
            .requires_role(Role::Partner)
            .shape(Shape::object([
                ("campaign_id", Shape::nullable(Shape::String)),
                ("impressions", Shape::Number),
                ("clicks", Shape::Number),
                ("spend", Shape::Number),
                ("series", Shape::array_of(metric())),
            ])),
        )
        .with(
            CapabilityDef::new("tenants.list", HttpMethod::Get, "/tenants")
                .timeout_ms(5_000)
                .requires_role(Role::SuperAdmin)
                .passthrough_auth()
                .shape(Shape::object([(
                    "items",
                    Shape::array_of(Shape::object([
                        ("tenant_id", Shape::String),
                        ("display_name", Shape::String),
                    ])),
                )])),
        )
        .with(
            CapabilityDef::new("media.library", HttpMethod::Get, "/tenants/{tenant_id}/media")
                .timeout_ms(5_000)
                .requires_role(Role::Client)
                .shape(Shape::object([
                    (
                        "items",
                        Shape::array_of(Shape::object([
                            ("id", Shape::String),
                            ("url", Shape::String),
                        ])),
                    ),
                    ("total", Shape::Number),
                ])),
        )
        .with(
            CapabilityDef::new("branding.get", HttpMethod::Get, "/tenants/{tenant_id}/branding")
                .timeout_ms(3_000)
                .shape(Shape::object([
                    ("logo_url", Shape::nullable(Shape::String)),
                    ("primary_color", Shape::nullable(Shape::String)),
                ])),
        )
        .with(
            CapabilityDef::new("workflows.submit", HttpMethod::Post, "/tenants/{tenant_id}/workflows")
                .timeout_ms(30_000)
                .requires_role(Role::Partner)
                .passthrough_auth()
                .shape(queued()),
        )
        .with(
            CapabilityDef::new("leads.create", HttpMethod::Post, "/tenants/{tenant_id}/leads")
                .timeout_ms(10_000)
                .shape(queued()),
        )
        .with(
            CapabilityDef::new(
                HANDSHAKE_CAPABILITY,
                HttpMethod::Post,
                "/tenants/{tenant_id}/connectors/{connector}/verify",
            )
            .timeout_ms(15_000)
            .internal()
            .shape(Shape::object([("verified", Shape::Bool)])),
        )
        .with(
            CapabilityDef::new(
                SYNC_CAPABILITY,
                HttpMethod::Post,
                "/tenants/{tenant_id}/connectors/{connector}/sync",
            )
            .timeout_ms(30_000)
            .internal()
            .shape(Shape::object([("records", Shape::Number)])),
        )
}

/// Degraded payloads. The handshake has none: unverified credentials must
/// never look verified.
pub fn fallbacks() -> FallbackProvider {
    FallbackProvider::new()
        .with_static(
            "tenant.dashboard",
            json!({ "widgets": [], "updated_at": null }),
        )
        .with_template("campaigns.metrics", |req| {
            let campaign_id = req
                .path_params
                .get("campaign_id")
                .or_else(|| req.query.get("campaign_id"));
            json!({
                "campaign_id": campaign_id,
                "impressions": 0,
                "clicks": 0,
                "spend": 0,
                "series": []
            })
        })
        .with_static("tenants.list", json!({ "items": [] }))
        .with_static("media.library", json!({ "items": [], "total": 0 }))
        .with_static(
            "branding.get",
            json!({ "logo_url": null, "primary_color": null }),
        )
        .with_template("workflows.submit", echo_with_placeholder_id)
        .with_template("leads.create", echo_with_placeholder_id)
        .with_static(SYNC_CAPABILITY, json!({ "records": 0 }))
}
