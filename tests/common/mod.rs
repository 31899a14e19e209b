#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SESSION_COOKIE: &str = "ASP.NET_SessionId=k3v9qf2m1x";

pub fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

pub fn load_fixture(relative: &str) -> String {
    std::fs::read_to_string(fixture_path(relative))
        .unwrap_or_else(|_| panic!("Failed to load fixture: {}", relative))
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html; charset=utf-8")
}

/// Base URL the session client should be configured with.
pub fn base_url(server: &MockServer) -> String {
    format!("{}/assessor/", server.uri())
}

/// Serves the search form and hands out the session cookie.
pub async fn mount_search_page(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/assessor/pcl.aspx"))
        .respond_with(
            html(load_fixture("search_page.html"))
                .insert_header("set-cookie", format!("{}; path=/; HttpOnly", SESSION_COOKIE).as_str()),
        )
        .mount(server)
        .await;
}

/// Matches the POST for one APN; requires the viewstate and session cookie to be echoed.
fn submission(apn: &str) -> wiremock::MockBuilder {
    Mock::given(method("POST"))
        .and(path("/assessor/pcl.aspx"))
        .and(header("cookie", SESSION_COOKIE))
        .and(body_string_contains("__VIEWSTATE="))
        .and(body_string_contains(format!("tbParcel={}", apn)))
}

/// POST answers with a 302 to the detail page, which serves `fixture`.
pub async fn mount_redirect_to_detail(server: &MockServer, apn: &str, fixture: &str) {
    let digits: String = apn.chars().filter(|c| c.is_ascii_digit()).collect();
    submission(apn)
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("ParcelDetail.aspx?hdnParcel={}", digits).as_str()),
        )
        .mount(server)
        .await;
    mount_detail(server, &digits, fixture).await;
}

/// POST answers with a script redirect to the detail page, which serves `fixture`.
pub async fn mount_script_redirect(server: &MockServer, apn: &str, fixture: &str) {
    let digits: String = apn.chars().filter(|c| c.is_ascii_digit()).collect();
    let page = format!(
        "<html><body><script>window.location.href = 'ParcelDetail.aspx?hdnParcel={}';</script></body></html>",
        digits
    );
    submission(apn).respond_with(html(page)).mount(server).await;
    mount_detail(server, &digits, fixture).await;
}

async fn mount_detail(server: &MockServer, digits: &str, fixture: &str) {
    Mock::given(method("GET"))
        .and(path("/assessor/ParcelDetail.aspx"))
        .and(query_param("hdnParcel", digits))
        .respond_with(html(load_fixture(fixture)))
        .mount(server)
        .await;
}

/// POST answers directly with `fixture`.
pub async fn mount_search_response(server: &MockServer, apn: &str, fixture: &str) {
    submission(apn)
        .respond_with(html(load_fixture(fixture)))
        .mount(server)
        .await;
}

/// POST never answers within the client's timeout.
pub async fn mount_stalled_search(server: &MockServer, apn: &str, delay: Duration) {
    submission(apn)
        .respond_with(html(load_fixture("not_found.html")).set_delay(delay))
        .mount(server)
        .await;
}
