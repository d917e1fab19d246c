//! Built-in smoke catalog.
//!
//! A small set of tests that exercise the orchestrator end to end through
//! [`ClusterClient`](crate::cluster::ClusterClient) CRUD and status polling.
//! Real conformance catalogs are supplied by the embedding program.

use serde_json::json;

use conformance_types::{ConfigResult, Feature};

use crate::catalog::{TestCase, TestCatalog};
use crate::cluster::{Resource, ResourceKey};
use crate::config::{BASE_NAMESPACES, INFRA_NAMESPACE};
use crate::context::TestContext;
use crate::error::TestResult;

/// The catalog shipped with the CLI.
pub fn builtin_catalog() -> ConfigResult<TestCatalog> {
    TestCatalog::new()
        .with(
            TestCase::from_fn("BaseNamespacesPresent", base_namespaces_present)
                .with_description("Base namespaces exist before any test runs"),
        )?
        .with(
            TestCase::from_fn("GatewayAccepted", gateway_accepted)
                .with_description("A Gateway for the tested class becomes Accepted and Programmed")
                .with_features([Feature::Gateway])
                .isolated(),
        )?
        .with(
            TestCase::from_fn("GatewayPort8080", gateway_port_8080)
                .with_description("A Gateway listener on port 8080 is accepted")
                .with_features([Feature::Gateway, Feature::GatewayPort8080])
                .isolated(),
        )?
        .with(
            TestCase::from_fn("HTTPRouteSimpleSameNamespace", httproute_same_namespace)
                .with_description("An HTTPRoute attached to a Gateway in its namespace is accepted")
                .with_features([Feature::Gateway, Feature::HttpRoute])
                .isolated(),
        )?
        .with(
            TestCase::from_fn("HTTPRouteQueryParamMatching", httproute_query_param_matching)
                .with_description("Query parameter matches are stored and accepted")
                .with_features([
                    Feature::Gateway,
                    Feature::HttpRoute,
                    Feature::HttpRouteQueryParamMatching,
                ])
                .isolated(),
        )?
        .with(
            TestCase::from_fn("ReferenceGrantLifecycle", reference_grant_lifecycle)
                .with_description("ReferenceGrants can be created, listed and removed")
                .with_features([Feature::Gateway, Feature::ReferenceGrant])
                .isolated(),
        )?
        .with(
            TestCase::from_fn("TLSRouteSimpleSameNamespace", tlsroute_same_namespace)
                .with_description("A TLSRoute attached to a TLS passthrough listener is accepted")
                .with_features([Feature::Gateway, Feature::TlsRoute])
                .isolated(),
        )?
        .with(
            TestCase::from_fn("MeshBackendsListable", mesh_backends_listable)
                .with_description("Backend namespaces are readable by the mesh")
                .with_features([Feature::Mesh]),
        )
}

fn gateway(ctx: &TestContext, name: &str, listeners: serde_json::Value) -> Resource {
    Resource::new(
        ResourceKey::new("Gateway", ctx.namespace(), name),
        json!({
            "gatewayClassName": ctx.gateway_class(),
            "listeners": listeners,
        }),
    )
}

fn http_listener(port: u16) -> serde_json::Value {
    json!([{ "name": "http", "protocol": "HTTP", "port": port }])
}

async fn base_namespaces_present(ctx: TestContext) -> TestResult {
    for namespace in BASE_NAMESPACES {
        let exists = ctx.cluster().namespace_exists(namespace).await?;
        ctx.ensure(exists, format!("namespace {} is missing", namespace))?;
    }
    Ok(())
}

async fn gateway_accepted(ctx: TestContext) -> TestResult {
    let gw = gateway(&ctx, "same-namespace", http_listener(80));
    let key = gw.key.clone();
    ctx.cluster().apply(gw).await?;

    ctx.wait_for_condition(&key, "Accepted").await?;
    let programmed = ctx.wait_for_condition(&key, "Programmed").await?;
    ctx.ensure_eq(
        &programmed.spec["gatewayClassName"].as_str(),
        &Some(ctx.gateway_class()),
        "gatewayClassName",
    )
}

async fn gateway_port_8080(ctx: TestContext) -> TestResult {
    let gw = gateway(&ctx, "port-8080", http_listener(8080));
    let key = gw.key.clone();
    ctx.cluster().apply(gw).await?;
    ctx.wait_for_condition(&key, "Accepted").await?;
    Ok(())
}

async fn httproute_same_namespace(ctx: TestContext) -> TestResult {
    let gw = gateway(&ctx, "same-namespace", http_listener(80));
    let gw_key = gw.key.clone();
    ctx.cluster().apply(gw).await?;
    ctx.wait_for_condition(&gw_key, "Programmed").await?;

    let route = Resource::new(
        ResourceKey::new("HTTPRoute", ctx.namespace(), "gateway-conformance-infra-test"),
        json!({
            "parentRefs": [{ "name": gw_key.name }],
            "rules": [{ "backendRefs": [{ "name": "infra-backend-v1", "port": 8080 }] }],
        }),
    );
    let route_key = route.key.clone();
    ctx.cluster().apply(route).await?;
    ctx.wait_for_condition(&route_key, "Accepted").await?;
    Ok(())
}

async fn httproute_query_param_matching(ctx: TestContext) -> TestResult {
    let gw = gateway(&ctx, "same-namespace", http_listener(80));
    let gw_key = gw.key.clone();
    ctx.cluster().apply(gw).await?;

    let matches = json!([{ "queryParams": [{ "name": "animal", "value": "whale" }] }]);
    let route = Resource::new(
        ResourceKey::new("HTTPRoute", ctx.namespace(), "query-param-matching"),
        json!({
            "parentRefs": [{ "name": gw_key.name }],
            "rules": [{
                "matches": matches,
                "backendRefs": [{ "name": "infra-backend-v1", "port": 8080 }],
            }],
        }),
    );
    let route_key = route.key.clone();
    ctx.cluster().apply(route).await?;

    let stored = ctx.wait_for_condition(&route_key, "Accepted").await?;
    ctx.ensure_eq(&stored.spec["rules"][0]["matches"], &matches, "stored matches")
}

async fn reference_grant_lifecycle(ctx: TestContext) -> TestResult {
    let grant = Resource::new(
        ResourceKey::new("ReferenceGrant", ctx.namespace(), "allow-infra-routes"),
        json!({
            "from": [{
                "group": "gateway.networking.k8s.io",
                "kind": "HTTPRoute",
                "namespace": INFRA_NAMESPACE,
            }],
            "to": [{ "group": "", "kind": "Service" }],
        }),
    );
    let key = grant.key.clone();
    ctx.cluster().apply(grant).await?;

    let listed = ctx.cluster().list("ReferenceGrant", ctx.namespace()).await?;
    ctx.ensure_eq(&listed.len(), &1, "ReferenceGrants after create")?;

    ctx.cluster().delete(&key).await?;
    let cluster = ctx.cluster();
    ctx.wait_for("ReferenceGrant deletion", ctx.timeouts().reconcile, || async {
        cluster.get(&key).await.map(|grant| grant.is_none())
    })
    .await
}

async fn tlsroute_same_namespace(ctx: TestContext) -> TestResult {
    let gw = gateway(
        &ctx,
        "tls-passthrough",
        json!([{
            "name": "tls",
            "protocol": "TLS",
            "port": 443,
            "tls": { "mode": "Passthrough" },
        }]),
    );
    let gw_key = gw.key.clone();
    ctx.cluster().apply(gw).await?;

    let route = Resource::new(
        ResourceKey::new("TLSRoute", ctx.namespace(), "gateway-conformance-tls"),
        json!({
            "parentRefs": [{ "name": gw_key.name }],
            "hostnames": ["abc.example.com"],
            "rules": [{ "backendRefs": [{ "name": "tls-backend", "port": 443 }] }],
        }),
    );
    let route_key = route.key.clone();
    ctx.cluster().apply(route).await?;
    ctx.wait_for_condition(&route_key, "Accepted").await?;
    Ok(())
}

async fn mesh_backends_listable(ctx: TestContext) -> TestResult {
    for namespace in &BASE_NAMESPACES[1..] {
        ctx.cluster().list("Service", namespace).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = builtin_catalog().unwrap();
        let names: BTreeSet<&str> = catalog.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.len(), catalog.len());
        assert_eq!(catalog.iter().next().unwrap().name, "BaseNamespacesPresent");
        assert!(catalog.iter().next().unwrap().features.is_empty());
    }
}
