use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hubkit_common::HubError;
use hubkit_core::router::{ApiContext, ApiError, ApiRequest, CapabilityRouter, ParamContract, Verb};
use hubkit_templates::MyApp;
use serde_json::{Value, json};

async fn starter_router() -> (CapabilityRouter<Arc<MyApp>>, Arc<MyApp>) {
    let manifest = hubkit_templates::template_manifest().unwrap();
    let (app, state) = hubkit_templates::build_app(&manifest).unwrap();
    hubkit_core::lifecycle::LifecycleDispatcher::new()
        .initialize_app(&app)
        .await
        .unwrap();
    let mut router = CapabilityRouter::new(app, Arc::clone(&state));
    hubkit_templates::api::register(&mut router, &manifest.api).unwrap();
    (router, state)
}

#[tokio::test]
async fn add_without_body_is_rejected_before_the_handler() {
    let (router, state) = starter_router().await;

    let err = router.dispatch(ApiRequest::new(Verb::Post, "/")).await.unwrap_err();

    assert!(matches!(err, HubError::BadRequest { .. }));
    assert_eq!(err.status(), 400);
    assert!(state.is_empty().await);
}

#[tokio::test]
async fn starter_endpoints_round_trip_an_item() {
    let (router, state) = starter_router().await;

    let greeting = router.dispatch(ApiRequest::new(Verb::Get, "/")).await.unwrap();
    assert_eq!(greeting, json!("Hello from App"));

    let added = router
        .dispatch(ApiRequest::new(Verb::Post, "/").with_body(json!({ "name": "lamp" })))
        .await
        .unwrap();
    let id = added["id"].as_u64().unwrap().to_string();

    let updated = router
        .dispatch(
            ApiRequest::new(Verb::Put, "/:id")
                .with_param("id", id.clone())
                .with_body(json!({ "name": "desk lamp" })),
        )
        .await
        .unwrap();
    assert_eq!(updated["name"], "desk lamp");

    router
        .dispatch(ApiRequest::new(Verb::Delete, "/:id").with_param("id", id.clone()))
        .await
        .unwrap();
    assert!(state.is_empty().await);

    let gone = router
        .respond(ApiRequest::new(Verb::Delete, "/:id").with_param("id", id))
        .await;
    assert_eq!(gone.status, 404);
    assert_eq!(gone.body["code"], "handler_error");
}

#[tokio::test]
async fn missing_query_key_never_reaches_the_handler() {
    let (app, _) = hubkit_templates::build_app(&hubkit_templates::template_manifest().unwrap()).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut router = CapabilityRouter::new(app, Arc::clone(&calls));
    router
        .register(
            "lookup",
            Verb::Get,
            "/lookup",
            ParamContract::new().query("name"),
            |request: ApiRequest, ctx: ApiContext<Arc<AtomicUsize>>| async move {
                ctx.state.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ApiError>(json!({ "name": request.query["name"] }))
            },
        )
        .unwrap();

    let err = router.dispatch(ApiRequest::new(Verb::Get, "/lookup")).await.unwrap_err();
    assert!(matches!(err, HubError::BadRequest { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let found = router
        .dispatch(ApiRequest::new(Verb::Get, "/lookup").with_query("name", "hall"))
        .await
        .unwrap();
    assert_eq!(found, json!({ "name": "hall" }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_routes_and_methods_are_not_found() {
    let (router, _) = starter_router().await;

    let wrong_path = router.dispatch(ApiRequest::new(Verb::Get, "/nope")).await.unwrap_err();
    assert!(matches!(wrong_path, HubError::NotFound { .. }));

    let response = router.respond(ApiRequest::new(Verb::Delete, "/")).await;
    assert_eq!(response.status, 404);
    assert_eq!(response.body["code"], Value::from("not_found"));
}

#[tokio::test]
async fn dispatches_run_side_by_side() {
    let (router, state) = starter_router().await;
    let router = Arc::new(router);

    let adds = (0..16).map(|n| {
        let router = Arc::clone(&router);
        tokio::spawn(async move {
            router
                .dispatch(ApiRequest::new(Verb::Post, "/").with_body(json!({ "name": format!("item-{n}") })))
                .await
        })
    });
    for add in adds.collect::<Vec<_>>() {
        add.await.unwrap().unwrap();
    }
    assert_eq!(state.len().await, 16);
}
