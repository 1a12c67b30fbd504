mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use sea_orm::EntityTrait;
use serde_json::json;
use stockyard_api::{
    entities::{location, LocationKind, TxnType},
    errors::ServiceError,
    services::{projects::NewProject, transactions::NewTransaction},
};

use common::{admin, manager, response_json, staff, TestApp};

fn new_project(code: Option<&str>, name: &str) -> NewProject {
    NewProject {
        code: code.map(str::to_string),
        name: name.to_string(),
        division_id: None,
    }
}

#[tokio::test]
async fn manager_creates_project_with_its_location() {
    let app = TestApp::new().await;
    let division = app.seed_division("North").await;
    let lead = manager(division);

    let project = app
        .state
        .services
        .projects
        .create_project(&lead, new_project(Some("bridge"), "  Bridge repair "))
        .await
        .expect("create project");

    assert_eq!(project.code, "BRIDGE");
    assert_eq!(project.name, "Bridge repair");
    assert_eq!(project.division_id, division);
    assert_eq!(project.created_by_id, lead.id);

    let loc = location::Entity::find_by_id(project.location_id)
        .one(app.db())
        .await
        .expect("lookup")
        .expect("project location");
    assert_eq!(loc.kind, LocationKind::Project);
    assert_eq!(loc.code, "PROJECT-BRIDGE");
    assert_eq!(loc.division_id, Some(division));
}

#[tokio::test]
async fn generated_code_when_none_given() {
    let app = TestApp::new().await;
    let division = app.seed_division("North").await;

    let project = app
        .state
        .services
        .projects
        .create_project(&manager(division), new_project(None, "Depot"))
        .await
        .expect("create project");

    assert!(project.code.starts_with("PRJ"));
    assert_eq!(project.code.len(), 8);
}

#[tokio::test]
async fn duplicate_codes_conflict() {
    let app = TestApp::new().await;
    let division = app.seed_division("North").await;
    app.seed_project("DAM", division).await;

    let err = app
        .state
        .services
        .projects
        .create_project(&manager(division), new_project(Some("dam"), "Second dam"))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn create_rules_by_role() {
    let app = TestApp::new().await;
    let division = app.seed_division("North").await;
    let projects = &app.state.services.projects;

    let err = projects
        .create_project(&staff(division), new_project(None, "Nope"))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let err = projects
        .create_project(&admin(), new_project(None, "Where"))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = projects
        .create_project(
            &admin(),
            NewProject {
                division_id: Some(uuid::Uuid::new_v4()),
                ..new_project(None, "Nowhere")
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "division not found");

    let err = projects
        .create_project(&manager(division), new_project(None, "x"))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn staff_only_see_their_division() {
    let app = TestApp::new().await;
    let north = app.seed_division("North").await;
    let south = app.seed_division("South").await;
    let ours = app.seed_project("OURS", north).await;
    app.seed_project("THEIRS", south).await;
    let projects = &app.state.services.projects;

    let visible = projects.list_projects(&staff(north)).await.expect("list");
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, ours.id);

    let all = projects.list_projects(&manager(north)).await.expect("list");
    assert_eq!(all.len(), 2);
    let all = projects.list_projects(&admin()).await.expect("list");
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn project_stock_lists_the_project_location() {
    let app = TestApp::new().await;
    let division = app.seed_division("North").await;
    let item = app.seed_item("CABLE-3", 0).await;
    let main = app.seed_warehouse("MAIN", Some(division)).await;
    let project = app.seed_project("BRIDGE", division).await;
    let lead = manager(division);

    app.state
        .services
        .transactions
        .record(
            &lead,
            NewTransaction::new(TxnType::ProjectIssue, item.id, 6)
                .from_location(main.id)
                .for_project(project.id),
        )
        .await
        .expect("issue");

    let response = app
        .request_as(
            &lead,
            Method::GET,
            &format!("/api/v1/projects/{}/stock", project.id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let lines = response_json(response).await;
    assert_eq!(lines.as_array().map(Vec::len), Some(1));
    assert_eq!(lines[0]["qty"], 6);
    assert_eq!(lines[0]["item"]["sku"], "CABLE-3");
    assert_eq!(lines[0]["location"]["code"], "PROJECT-BRIDGE");

    let response = app
        .request_as(
            &lead,
            Method::GET,
            &format!("/api/v1/projects/{}/stock", uuid::Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_project_over_http() {
    let app = TestApp::new().await;
    let division = app.seed_division("North").await;

    let response = app
        .request_as(
            &manager(division),
            Method::POST,
            "/api/v1/projects",
            Some(json!({ "code": "TUNNEL", "name": "Tunnel works" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["code"], "TUNNEL");
    assert_eq!(body["divisionId"], division.to_string());

    let response = app
        .request_as(
            &manager(division),
            Method::POST,
            "/api/v1/projects",
            Some(json!({ "code": "TUNNEL", "name": "Tunnel again" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .request_as(&staff(division), Method::GET, "/api/v1/projects", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}
