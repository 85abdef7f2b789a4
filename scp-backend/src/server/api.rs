use axum::{
    Router,
    routing::{get, patch, post},
};
use scp_core::model::{
    Endpoint,
    project::NewProjectMetadatum,
    study::{NewStudy, Study, StudySettings},
    user_annotation::NewUserAnnotation,
};

use super::AppState;

mod cluster;
mod context;
mod download;
mod error;
mod expression;
mod handler;
mod metadata;
mod study;
mod user_annotation;

const STUDY: &str = "/study/{study_name}";

fn study_route(suffix: &str) -> String {
    format!("{STUDY}/{suffix}")
}

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(study::index))
        .route(&NewStudy::endpoint(), get(study::list).post(study::create))
        .route(&Study::endpoint(), get(study::fetch))
        .route(&StudySettings::endpoint(), patch(study::update_settings))
        .route(STUDY, get(study::overview))
        .route("/render_cluster/{study_name}", get(cluster::render_cluster))
        .route(&study_route("search"), post(expression::search_genes))
        .route(
            &study_route("gene_expression/{gene}"),
            get(expression::view_gene_expression),
        )
        .route(
            &study_route("render_gene_expression_plots/{gene}"),
            get(expression::render_gene_expression_plots),
        )
        .route(
            &study_route("gene_set_expression"),
            get(expression::view_gene_set_expression),
        )
        .route(
            &study_route("render_gene_set_expression_plots"),
            get(expression::render_gene_set_expression_plots),
        )
        .route(&study_route("gene_expression"), get(expression::view_heatmap))
        .route(&study_route("expression_query"), get(expression::expression_query))
        .route(&study_route("annotation_query"), get(expression::annotation_query))
        .route(&study_route("annotation_values"), get(expression::annotation_values))
        .route(
            &study_route("get_new_annotations"),
            get(expression::get_new_annotations),
        )
        .route(
            &study_route("precomputed_results"),
            get(expression::precomputed_results),
        )
        .route(&study_route("dot_plot"), get(expression::render_dot_plot))
        .route(&NewUserAnnotation::endpoint(), post(user_annotation::create))
        .route(&study_route("data/{filename}"), get(download::download_file))
        .route("/totat", post(download::create_totat))
        .route(
            &study_route("download_bulk_files"),
            get(download::download_bulk_files),
        )
        .route(
            &NewProjectMetadatum::endpoint(),
            post(metadata::create_project_metadata),
        )
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use bson::doc;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::{
        config::Config,
        db::Store,
        server::{AppState, app, auth::API_KEY_HEADER},
    };

    const OWNER_KEY: &str = "0123456789abcdefghijklmnopqrstuv";
    const OTHER_KEY: &str = "vutsrqponmlkjihgfedcba9876543210";

    fn config() -> Config {
        serde_json::from_value(config_json()).unwrap()
    }

    fn config_json() -> Value {
        json!({
            "host": "localhost",
            "port": 0,
            "storage_base_url": "http://storage.test",
            "seed_data": {
                "users": [
                    { "email": "owner@example.com", "api_key": OWNER_KEY },
                    { "email": "other@example.com", "api_key": OTHER_KEY }
                ],
                "studies": [
                    {
                        "name": "Mouse Brain",
                        "owner": "owner@example.com",
                        "clusters": [{
                            "name": "tSNE",
                            "x": [1.0, 2.0, 3.0, 4.0],
                            "y": [4.0, 3.0, 2.0, 1.0],
                            "cells": ["a", "b", "c", "d"],
                            "annotations": [
                                { "name": "Type", "type": "group", "values": ["T", "B", "T", "B"] },
                                { "name": "Depth", "type": "numeric", "values": [0.5, 1.0, 1.5, 2.0] }
                            ]
                        }],
                        "genes": [
                            { "name": "Sst", "scores": { "a": 1.0, "b": 0.0, "c": 2.0, "d": 0.5 } },
                            { "name": "Gad1", "scores": { "a": 0.0, "b": 3.0 } }
                        ],
                        "files": [{ "name": "cluster.txt", "file_type": "Cluster", "size": 10 }]
                    },
                    {
                        "name": "Private Study",
                        "owner": "owner@example.com",
                        "public": false
                    }
                ]
            }
        })
    }

    async fn build(config: Config) -> (Router, Store) {
        let app_state = AppState::new(config).await.unwrap();
        app_state.store().prepare().await.unwrap();
        app_state.write_seed_data().await.unwrap();
        let store = app_state.store().clone();

        (app(app_state), store)
    }

    #[fixture]
    async fn router() -> Router {
        build(config()).await.0
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, String, Option<String>) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .map(|l| l.to_str().unwrap().to_string());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        (status, String::from_utf8(body.to_vec()).unwrap(), location)
    }

    fn get(uri: &str, api_key: Option<&str>) -> Request<Body> {
        let mut request = Request::get(uri);
        if let Some(api_key) = api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }
        request.body(Body::empty()).unwrap()
    }

    fn post(uri: &str, api_key: Option<&str>, body: &Value) -> Request<Body> {
        let mut request = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(api_key) = api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }
        request.body(Body::from(body.to_string())).unwrap()
    }

    fn json_body(body: &str) -> Value {
        serde_json::from_str(body).unwrap()
    }

    #[rstest]
    #[tokio::test]
    async fn index_lists_public_studies(#[future] router: Router) {
        let router = router.await;

        let (status, body, _) = send(&router, get("/", None)).await;
        assert_eq!(status, StatusCode::OK);

        let index = json_body(&body);
        assert_eq!(index["study_count"], 1);
        assert_eq!(index["cell_count"], 4);
        assert_eq!(index["studies"][0]["accession"], "SCP1");
    }

    #[rstest]
    #[case(None, StatusCode::FORBIDDEN)]
    #[case(Some(OTHER_KEY), StatusCode::FORBIDDEN)]
    #[case(Some(OWNER_KEY), StatusCode::OK)]
    #[tokio::test]
    async fn private_studies_need_permission(
        #[future] router: Router,
        #[case] api_key: Option<&str>,
        #[case] expected: StatusCode,
    ) {
        let router = router.await;

        let (status, ..) = send(&router, get("/studies/private-study", api_key)).await;
        assert_eq!(status, expected);
    }

    #[rstest]
    #[tokio::test]
    async fn creating_a_study_requires_an_api_key(#[future] router: Router) {
        let router = router.await;
        let new_study = json!({ "name": "Human Retina" });

        let (status, body, _) = send(&router, post("/studies", None, &new_study)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            json_body(&body),
            json!({ "status": 401, "error": { "type": "invalid_api_key" } })
        );

        let (status, body, _) = send(&router, post("/studies", Some(OWNER_KEY), &new_study)).await;
        assert_eq!(status, StatusCode::CREATED);
        let study = json_body(&body);
        assert_eq!(study["url_safe_name"], "human-retina");
        assert_eq!(study["accession"], "SCP3");

        let (status, ..) = send(&router, post("/studies", Some(OWNER_KEY), &new_study)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[rstest]
    #[tokio::test]
    async fn only_editors_change_settings(#[future] router: Router) {
        let router = router.await;
        let patch = |api_key: &str| {
            Request::patch("/studies/mouse-brain/settings")
                .header(header::CONTENT_TYPE, "application/json")
                .header(API_KEY_HEADER, api_key)
                .body(Body::from(json!({ "name": "Mouse Cortex" }).to_string()))
                .unwrap()
        };

        let (status, ..) = send(&router, patch(OTHER_KEY)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body, _) = send(&router, patch(OWNER_KEY)).await;
        assert_eq!(status, StatusCode::OK);
        let update = json_body(&body);
        assert_eq!(update["study"]["url_safe_name"], "mouse-cortex");
        assert_eq!(update["previous_url_safe_name"], "mouse-brain");

        let (status, ..) = send(&router, get("/studies/mouse-cortex", None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[rstest]
    #[tokio::test]
    async fn group_annotations_split_cluster_traces(#[future] router: Router) {
        let router = router.await;

        let (status, body, _) = send(&router, get("/render_cluster/mouse-brain", None)).await;
        assert_eq!(status, StatusCode::OK);

        let plot = json_body(&body);
        assert_eq!(plot["annotation"]["name"], "Type");
        assert_eq!(plot["traces"]["B"]["name"], "Type: B (2 points)");
        assert_eq!(plot["traces"]["T"]["name"], "Type: T (2 points)");
        assert_eq!(plot["is_3d"], false);
    }

    #[rstest]
    #[case(json!({ "genes": "sst" }), "/study/mouse-brain/gene_expression/Sst")]
    #[case(json!({ "genes": "Sst Gad1" }), "/study/mouse-brain/gene_expression?search_terms=Sst+Gad1")]
    #[case(
        json!({ "genes": "Sst, Gad1", "consensus": "median" }),
        "/study/mouse-brain/gene_set_expression?search_terms=Sst+Gad1&consensus=median"
    )]
    #[tokio::test]
    async fn gene_search_redirects(#[future] router: Router, #[case] search: Value, #[case] expected: &str) {
        let router = router.await;

        let (status, _, location) = send(&router, post("/study/mouse-brain/search", None, &search)).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location.as_deref(), Some(expected));
    }

    #[rstest]
    #[tokio::test]
    async fn unknown_genes_are_not_found(#[future] router: Router) {
        let router = router.await;
        let search = json!({ "genes": "Pvalb" });

        let (status, ..) = send(&router, post("/study/mouse-brain/search", None, &search)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[rstest]
    #[tokio::test]
    async fn expression_query_renders_gct(#[future] router: Router) {
        let router = router.await;

        let (status, body, _) = send(
            &router,
            get("/study/mouse-brain/expression_query?search_terms=Sst", None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            "#1.2\n1\t4\nName\tDescription\ta\tb\tc\td\nSst\t\t1.0\t0.0\t2.0\t0.5"
        );
    }

    #[rstest]
    #[tokio::test]
    async fn annotation_query_renders_tsv(#[future] router: Router) {
        let router = router.await;

        let (status, body, _) = send(
            &router,
            get(
                "/study/mouse-brain/annotation_query?annotation=Type--group--cluster",
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "NAME\tType\na\tT\nb\tB\nc\tT\nd\tB");
    }

    #[rstest]
    #[tokio::test]
    async fn numeric_annotations_plot_against_expression(#[future] router: Router) {
        let router = router.await;

        let (status, body, _) = send(
            &router,
            get(
                "/study/mouse-brain/render_gene_expression_plots/Sst?annotation=Depth--numeric--cluster",
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let plots = json_body(&body);
        assert_eq!(plots["plot_type"], "scatter");
        assert_eq!(plots["values"]["all"]["x"], json!([0.5, 1.0, 1.5, 2.0]));
    }

    #[rstest]
    #[tokio::test]
    async fn dot_plots_need_group_annotations(#[future] router: Router) {
        let router = router.await;

        let (status, ..) = send(
            &router,
            get(
                "/study/mouse-brain/dot_plot?search_terms=Sst&annotation=Depth--numeric--cluster",
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body, _) = send(&router, get("/study/mouse-brain/dot_plot?search_terms=Sst", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["values"], json!(["B", "T"]));
    }

    #[rstest]
    #[tokio::test]
    async fn user_annotations_are_offered_to_their_creator(#[future] router: Router) {
        let router = router.await;
        let new_annotation = json!({
            "name": "Picked",
            "cluster": "tSNE",
            "selections": [{ "name": "left", "values": "a,b" }]
        });

        let (status, body, _) = send(
            &router,
            post("/study/mouse-brain/user_annotations", Some(OTHER_KEY), &new_annotation),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json_body(&body)["values"], json!(["left", "Undefined"]));

        let (_, body, _) = send(&router, get("/study/mouse-brain/get_new_annotations", Some(OTHER_KEY))).await;
        assert_eq!(json_body(&body)["user"][0]["label"], "Picked");

        let (_, body, _) = send(&router, get("/study/mouse-brain/get_new_annotations", Some(OWNER_KEY))).await;
        assert_eq!(json_body(&body)["user"], json!([]));

        let (_, body, _) = send(&router, get("/study/mouse-brain/get_new_annotations", Some(OTHER_KEY))).await;
        let selector = json_body(&body)["user"][0]["value"].as_str().unwrap().to_string();
        let uri = format!("/study/mouse-brain/annotation_query?annotation={selector}");
        let (status, body, _) = send(&router, get(&uri, Some(OTHER_KEY))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "NAME\tPicked\na\tleft\nb\tleft\nc\tUndefined\nd\tUndefined");

        let (status, ..) = send(
            &router,
            post("/study/mouse-brain/user_annotations", Some(OTHER_KEY), &new_annotation),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[rstest]
    #[tokio::test]
    async fn single_file_downloads_redirect_to_signed_urls(#[future] router: Router) {
        let router = router.await;

        let (status, ..) = send(&router, get("/study/mouse-brain/data/cluster.txt", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, location) = send(&router, get("/study/mouse-brain/data/cluster.txt", Some(OTHER_KEY))).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location.as_deref(), Some("http://storage.test/SCP1/cluster.txt"));

        let (status, ..) = send(&router, get("/study/mouse-brain/data/missing.txt", Some(OTHER_KEY))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[rstest]
    #[tokio::test]
    async fn bulk_download_tokens_are_single_use(#[future] router: Router) {
        let router = router.await;

        let (status, body, _) = send(&router, post("/totat", Some(OWNER_KEY), &json!({}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let totat = json_body(&body);
        assert_eq!(totat["time_interval"], 1800);
        let token = totat["totat"].as_str().unwrap().to_string();

        let uri = format!("/study/mouse-brain/download_bulk_files?auth_code={token}");

        let (status, body, _) = send(&router, get(&uri, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("--create-dirs\n\n--compressed"));
        assert!(body.contains("url=\"http://storage.test/SCP1/cluster.txt\"\noutput=\"SCP1/cluster.txt\""));

        let (status, ..) = send(&router, get(&uri, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn refused_bulk_downloads_keep_their_token() {
        let mut config = config_json();
        config["download_quota"] = json!(10);
        let (router, store) = build(serde_json::from_value(config).unwrap()).await;

        let (status, body, _) = send(&router, post("/totat", Some(OWNER_KEY), &json!({}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let token = json_body(&body)["totat"].as_str().unwrap().to_string();

        let (status, ..) = send(&router, get("/study/mouse-brain/data/cluster.txt", Some(OWNER_KEY))).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        let (status, body, _) = send(&router, get("/study/mouse-brain/data/cluster.txt", Some(OWNER_KEY))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json_body(&body)["error"]["type"], "quota");

        let uri = format!("/study/mouse-brain/download_bulk_files?auth_code={token}");
        let (status, body, _) = send(&router, get(&uri, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json_body(&body)["error"]["type"], "quota");

        store
            .set("users", doc! {}, doc! { "daily_download_quota": 0_i64 })
            .await
            .unwrap();
        let (status, body, _) = send(&router, get(&uri, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("output=\"SCP1/cluster.txt\""));
    }
}
