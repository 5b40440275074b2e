use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fsumi_core::NewsRecord;
use fsumi_storage::GoogleEndpoints;
use fsumi_sync::{exit_code, run_once_mode, ConfigError, NewsPipeline, ScraperConfig};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn workspace_file(rel: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..").join(rel);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()))
}

fn config_for(server: &MockServer, data_dir: &Path) -> ScraperConfig {
    let pem = workspace_file("fixtures/google/test_service_account.pem");
    let mut config = ScraperConfig::from_lookup(|key| match key {
        "GOOGLE_SERVICE_ACCOUNT_EMAIL" => Some("scraper@fsumi-test.iam.gserviceaccount.com".into()),
        "GOOGLE_PRIVATE_KEY" => Some(pem.clone()),
        "GOOGLE_SPREADSHEET_6ID" => Some("sheet-123".into()),
        _ => None,
    })
    .expect("config");
    config.listing_url = format!("{}/index.php/actualites/", server.uri());
    config.site_origin = server.uri();
    config.pages = 2;
    config.request_delay = Duration::ZERO;
    config.data_dir = data_dir.to_path_buf();
    config.google = GoogleEndpoints {
        token_url: format!("{}/token", server.uri()),
        sheets_base: server.uri(),
    };
    config
}

async fn mount_listing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/index.php/actualites/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(workspace_file("fixtures/fs-umi/listing_page1.html")),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/index.php/actualites/page/2/"))
        .respond_with(ResponseTemplate::new(502))
        .mount(server)
        .await;
}

fn read_backup(path: &Path) -> Vec<NewsRecord> {
    serde_json::from_str(&std::fs::read_to_string(path).expect("backup file")).expect("backup json")
}

#[tokio::test]
async fn run_merges_new_items_ahead_of_the_sheet_and_mirrors_locally() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_listing(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet-123"))
        .and(query_param("fields", "sheets.properties.title"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sheets": [{"properties": {"title": "Actualites"}}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet-123/values/Actualites!A:E"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [
                ["title", "date", "link", "image_url", "categories"],
                ["Avis de soutenance de doctorat", "12 avril 2024", "https://www.fs-umi.ac.ma/a", "", "Annonces"],
                ["Rentrée universitaire", "2 septembre 2023", "https://www.fs-umi.ac.ma/r"]
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet-123/values/Actualites!A1:E1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["title", "date", "link", "image_url", "categories"]]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sheet-123/values/Actualites!A2:Z1000:clear"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sheet-123/values/Actualites!A:E:append"))
        .and(query_param("valueInputOption", "USER_ENTERED"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "updates": {"updatedRows": 4}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server, dir.path());
    let backup_path = config.backup_path();
    let pipeline = NewsPipeline::new(Arc::new(config)).expect("pipeline");

    let summary = pipeline.run_once().await.expect("run");

    assert_eq!(summary.known, 2);
    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.failed_pages, 1);
    assert_eq!(summary.new, 2);
    assert_eq!(summary.total, 4);
    assert!(summary.store_updated);
    assert!(summary.backup_written);

    let saved = read_backup(&backup_path);
    let titles: Vec<&str> = saved.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "Calendrier des examens – Semestre 2",
            "Inscriptions en Master 2024-2025",
            "Avis de soutenance de doctorat",
            "Rentrée universitaire",
        ]
    );
    assert_eq!(
        saved[0].link,
        format!("{}/index.php/actualites/calendrier-examens-s2/", server.uri())
    );
    assert_eq!(saved[2].link, "https://www.fs-umi.ac.ma/a");
}

#[tokio::test]
async fn unreachable_sheet_falls_back_to_backup_and_still_succeeds() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_listing(&server).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized_client"))
        .mount(&server)
        .await;

    let config = config_for(&server, dir.path());
    let backup_path = config.backup_path();
    std::fs::write(
        &backup_path,
        r#"[{"title":"Inscriptions en Master 2024-2025","link":"https://www.fs-umi.ac.ma/m"},{"title":"C"}]"#,
    )
    .unwrap();
    let pipeline = Arc::new(NewsPipeline::new(Arc::new(config)).expect("pipeline"));

    let outcome = run_once_mode(pipeline).await;

    assert!(outcome.success);
    assert!(!outcome.store_updated);
    assert_eq!(outcome.new, 2);
    assert_eq!(outcome.total, 4);
    assert_eq!(exit_code(&outcome), 0);

    let saved = read_backup(&backup_path);
    assert_eq!(saved[2].link, "https://www.fs-umi.ac.ma/m");
    assert_eq!(saved[3], NewsRecord::new("C", ""));
}

#[test]
fn missing_credentials_name_every_variable() {
    let err = ScraperConfig::from_lookup(|_| None).unwrap_err();
    let ConfigError::MissingVars(vars) = &err;
    assert_eq!(
        vars,
        &["GOOGLE_SERVICE_ACCOUNT_EMAIL", "GOOGLE_PRIVATE_KEY", "GOOGLE_SPREADSHEET_6ID"]
    );
    assert!(err.to_string().contains("GOOGLE_SPREADSHEET_6ID"));
}
