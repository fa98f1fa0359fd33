//! Integration tests for common Trellis workflows.
//!
//! These drive a kernel end to end through the test client.

use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use trellis::prelude::*;
use trellis::{KernelConfig, NOT_FOUND_MESSAGE, from_fn};
use trellis_testing::*;

fn client(kernel: Kernel) -> TestClient {
    TestClient::new(Arc::new(kernel))
}

// =============================================================================
// Routing Tests
// =============================================================================

#[test]
fn test_unmatched_route_is_not_found() {
    let response = client(Kernel::new()).get("/nowhere");
    assert_status(&response, 404);
    assert_body(&response, NOT_FOUND_MESSAGE);
}

#[test]
fn test_wrong_method_lists_allowed_methods() {
    let mut kernel = Kernel::new();
    kernel
        .router(|r| {
            r.add_route(["GET", "POST"], "/posts", action(|_| Ok("posts")))?;
            Ok(())
        })
        .unwrap();

    let response = client(kernel).delete("/posts");
    assert_status(&response, 405);
    assert_header(&response, "allow", "GET, POST");
}

#[test]
fn test_path_parameters_reach_the_action() {
    let mut kernel = Kernel::new();
    kernel
        .router(|r| {
            r.get(
                "/foo/{bar}/{baz}",
                action(|args| Ok(format!("{}{}", args.require("bar")?, args.require("baz")?))),
            )?;
            Ok(())
        })
        .unwrap();

    let response = client(kernel).get("/foo/1/2");
    assert_success(&response);
    assert_body(&response, "12");
}

// =============================================================================
// Controller Tests
// =============================================================================

#[test]
fn test_container_bound_controller() {
    let controller = MockController::new("PostController")
        .with_action("show", "one post")
        .with_action("__invoke", "all posts");
    let spy = controller.spy().clone();

    let container = Container::new();
    container.bind_controller("PostController", move |_| Ok(controller.clone()));

    let mut kernel = Kernel::with_resolver(ContainerResolver::new(container));
    kernel
        .router(|r| {
            r.get("/posts", "PostController")?;
            r.get("/posts/{id}", "PostController@show")?;
            r.get("/posts/{id}/edit", "PostController@edit")?;
            Ok(())
        })
        .unwrap();
    let client = client(kernel);

    assert_body(&client.get("/posts/7"), "one post");
    assert_body(&client.get("/posts"), "all posts");
    assert_server_error(&client.get("/posts/7/edit"));

    assert_eq!(spy.calls_to("show"), 1);
    assert_eq!(spy.calls()[0].1, vec!["id=7".to_string()]);
    assert!(spy.was_called("__invoke"));
    assert!(spy.was_called("edit"));
}

#[test]
fn test_service_injection_through_container() {
    struct Greeting(&'static str);

    let container = Container::new();
    container.register(Greeting("Howdy"));

    let mut kernel = Kernel::with_resolver(ContainerResolver::new(container));
    kernel
        .router(|r| {
            r.get(
                "/greet/{name}",
                action(|args| {
                    let greeting = args.service::<Greeting>()?;
                    Ok(format!("{}, {}", greeting.0, args.require("name")?))
                }),
            )?;
            Ok(())
        })
        .unwrap();

    assert_body(&client(kernel).get("/greet/ada"), "Howdy, ada");
}

// =============================================================================
// Normalization Tests
// =============================================================================

#[derive(Debug, Deserialize, PartialEq)]
struct Item {
    id: u32,
    name: String,
}

#[test]
fn test_structured_results_become_json() {
    let mut kernel = Kernel::new();
    kernel
        .router(|r| {
            r.get("/items", action(|_| Ok(json!([{"id": 1, "name": "bolt"}]))))?;
            r.get("/plain", action(|_| Ok("just text")))?;
            Ok(())
        })
        .unwrap();
    let client = client(kernel);

    let response = client.get("/items");
    assert_json_content_type(&response);
    assert_json(
        &response,
        &vec![Item {
            id: 1,
            name: "bolt".into(),
        }],
    );

    let response = client.get("/plain");
    assert_body(&response, "just text");
    assert_no_header(&response, "content-type");
}

#[test]
fn test_json_request_body_round_trip() {
    let mut kernel = Kernel::new();
    kernel
        .router(|r| {
            r.post(
                "/echo",
                action(|args| {
                    let request = args
                        .request()
                        .ok_or_else(|| Error::Invocation("no request".into()))?;
                    Ok(json!({ "name": request.input_str("name") }))
                }),
            )?;
            Ok(())
        })
        .unwrap();

    let response = client(kernel).send(
        TestRequestBuilder::new("POST", "/echo")
            .json(&json!({"name": "widget"}))
            .unwrap(),
    );
    assert_json(&response, &json!({"name": "widget"}));
}

#[test]
fn test_soft_error_status_is_honoured() {
    let mut kernel = Kernel::new();
    kernel
        .router(|r| {
            r.get(
                "/secret",
                action(|_| {
                    Ok(SoftError::new("rest_forbidden", "Sorry").with_data(json!({"status": 403})))
                }),
            )?;
            Ok(())
        })
        .unwrap();

    assert_status(&client(kernel).get("/secret"), 403);
}

// =============================================================================
// Error Handling Tests
// =============================================================================

#[test]
fn test_faults_are_logged_and_hidden() {
    let logger = RecordingLogger::new();
    let mut kernel = Kernel::new();
    kernel.set_logger(logger.clone());
    kernel
        .router(|r| {
            r.get(
                "/boom",
                action(|_| -> trellis::Result<()> {
                    Err(Error::Invocation("database password is hunter2".into()))
                }),
            )?;
            r.get(
                "/slow-down",
                action(|_| -> trellis::Result<()> { Err(HttpError::too_many_requests().into()) }),
            )?;
            Ok(())
        })
        .unwrap();
    let client = client(kernel);

    let response = client.get("/boom");
    assert_status(&response, 500);
    assert!(!response.body_string().unwrap().contains("hunter2"));

    let response = client.get("/slow-down");
    assert_status(&response, 429);
    assert_no_header(&response, "allow");

    let faults = logger.faults();
    assert_eq!(faults.len(), 2);
    assert_eq!(faults[0].kind, "invocation");
    assert_eq!(faults[1].status, 429);
    assert_eq!(faults[1].message, "Too Many Requests");
}

#[test]
fn test_failing_logger_still_responds() {
    let mut kernel = Kernel::new();
    kernel.set_logger(FailingLogger);
    assert_status(&client(kernel).get("/missing"), 404);
}

#[test]
fn test_panicking_action_becomes_server_error() {
    let mut kernel = Kernel::new();
    kernel
        .router(|r| {
            r.get("/panic", action(|_| -> trellis::Result<()> { panic!("kaboom") }))?;
            Ok(())
        })
        .unwrap();

    assert_server_error(&client(kernel).get("/panic"));
}

#[test]
fn test_debug_mode_from_config() {
    let config = KernelConfig::from_toml_str("debug = true").unwrap();
    let mut kernel = Kernel::new().with_config(&config);
    kernel
        .router(|r| {
            r.get(
                "/broken",
                action(|_| -> trellis::Result<()> { Err(HttpError::conflict().into()) }),
            )?;
            Ok(())
        })
        .unwrap();

    let response = client(kernel).get("/broken");
    assert_status(&response, 409);
    assert_html_content_type(&response);
    assert_body_contains(&response, "Conflict");
    assert!(response.assert_success().exception().is_some());
}

// =============================================================================
// Middleware Tests
// =============================================================================

#[test]
fn test_middleware_wraps_the_action() {
    let mut kernel = Kernel::new();
    kernel
        .router(|r| {
            r.get("/", action(|_| Ok("home")))?;
            Ok(())
        })
        .unwrap();
    kernel.middleware(from_fn(|request, next| {
        next(request)?.with_header("x-powered-by", "trellis")
    }));

    let client = client(kernel);
    assert_header(&client.get("/"), "x-powered-by", "trellis");
    assert_no_header(&client.get("/missing"), "x-powered-by");
}
