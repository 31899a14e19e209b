//! Reading the assessor's ASP.NET pages: hidden state tokens on the search
//! form, and where a search submission actually landed.

use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{FetchError, FetchErrorKind};

/// Hidden inputs the site expects to be echoed back on submission.
pub const STATE_FIELDS: [&str; 5] = [
    "__VIEWSTATE",
    "__VIEWSTATEGENERATOR",
    "__EVENTVALIDATION",
    "__EVENTTARGET",
    "__EVENTARGUMENT",
];

/// Element ids that only appear on a parcel detail page.
const DETAIL_IDS: [&str; 3] = ["lblParcel", "lblOwner1", "lblAddr1"];

/// State tokens taken from one search page, valid for exactly one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormTokens {
    pub action: Url,
    fields: Vec<(String, String)>,
}

impl FormTokens {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Consumes the tokens into the full POST body for `apn`.
    pub fn into_submission(self, apn: &str, config: &ClientConfig) -> (Url, Vec<(String, String)>) {
        let mut body = self.fields;
        body.push((config.apn_field.clone(), apn.to_string()));
        body.extend(config.extra_fields.iter().cloned());
        (self.action, body)
    }
}

/// Finds the search form and its state tokens.
pub fn extract_tokens(html: &str, page_url: &Url, config: &ClientConfig) -> Result<FormTokens, FetchError> {
    let document = Html::parse_document(html);
    let form_sel = Selector::parse("form").expect("static selector is valid");
    let input_sel = Selector::parse("input[name]").expect("static selector is valid");

    let form = document
        .select(&form_sel)
        .find(|form| {
            form.select(&input_sel)
                .any(|input| input.value().attr("name") == Some(config.apn_field.as_str()))
        })
        .ok_or_else(|| {
            FetchError::new(
                FetchErrorKind::PageLoadFailed,
                format!("search page has no form with field '{}'", config.apn_field),
            )
        })?;

    let mut fields: Vec<(String, String)> = Vec::new();
    for input in form.select(&input_sel) {
        let Some(name) = input.value().attr("name") else {
            continue;
        };
        if STATE_FIELDS.contains(&name) && !fields.iter().any(|(n, _)| n == name) {
            let value = input.value().attr("value").unwrap_or_default();
            fields.push((name.to_string(), value.to_string()));
        }
    }

    for required in &config.required_tokens {
        let present = fields.iter().any(|(n, v)| n == required && !v.is_empty());
        if !present {
            return Err(FetchError::new(
                FetchErrorKind::TokenMissing,
                format!("hidden field '{}' missing, site layout may have changed", required),
            ));
        }
    }

    let action = form
        .value()
        .attr("action")
        .filter(|a| !a.trim().is_empty())
        .and_then(|a| page_url.join(a.trim()).ok())
        .unwrap_or_else(|| page_url.clone());

    Ok(FormTokens { action, fields })
}

/// Where a search submission landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Landing {
    Detail,
    Redirect(Url),
    Choices(Vec<Url>),
}

fn js_redirect_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"location(?:\.href)?\s*=\s*["']([^"']+)["']"#).expect("redirect pattern is valid")
    })
}

fn meta_refresh_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)url\s*=\s*['"]?([^'";]+)"#).expect("refresh pattern is valid"))
}

/// Classifies the response to a search POST.
pub fn classify_landing(html: &str, final_url: &Url, detail_marker: &str) -> Landing {
    let marker = detail_marker.to_ascii_lowercase();
    let is_detail = |s: &str| s.to_ascii_lowercase().contains(&marker);

    if is_detail(final_url.path()) {
        return Landing::Detail;
    }

    let document = Html::parse_document(html);
    for id in DETAIL_IDS {
        let sel = Selector::parse(&format!("#{}", id)).expect("static selector is valid");
        if document.select(&sel).next().is_some() {
            return Landing::Detail;
        }
    }

    let script_sel = Selector::parse("script").expect("static selector is valid");
    for script in document.select(&script_sel) {
        let body = script.text().collect::<String>();
        for caps in js_redirect_regex().captures_iter(&body) {
            if is_detail(&caps[1]) {
                if let Ok(url) = final_url.join(&caps[1]) {
                    return Landing::Redirect(url);
                }
            }
        }
    }

    let meta_sel = Selector::parse("meta[http-equiv]").expect("static selector is valid");
    for meta in document.select(&meta_sel) {
        let refresh = meta
            .value()
            .attr("http-equiv")
            .map_or(false, |v| v.eq_ignore_ascii_case("refresh"));
        let target = meta
            .value()
            .attr("content")
            .and_then(|c| meta_refresh_regex().captures(c))
            .map(|caps| caps[1].trim().to_string());
        if let (true, Some(target)) = (refresh, target) {
            if is_detail(&target) {
                if let Ok(url) = final_url.join(&target) {
                    return Landing::Redirect(url);
                }
            }
        }
    }

    let form_sel = Selector::parse("form[action]").expect("static selector is valid");
    for form in document.select(&form_sel) {
        if let Some(action) = form.value().attr("action") {
            if is_detail(action) {
                if let Ok(url) = final_url.join(action) {
                    return Landing::Redirect(url);
                }
            }
        }
    }

    let link_sel = Selector::parse("a[href]").expect("static selector is valid");
    let mut choices: Vec<Url> = Vec::new();
    for link in document.select(&link_sel) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if !is_detail(href) {
            continue;
        }
        if let Ok(url) = final_url.join(href) {
            if !choices.contains(&url) {
                choices.push(url);
            }
        }
    }
    Landing::Choices(choices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_url() -> Url {
        Url::parse("https://assessor.example/AssessorParcelDetail/pcl.aspx").unwrap()
    }

    const SEARCH_PAGE: &str = r#"<html><body>
        <form method="post" action="./pcl.aspx" id="form1">
          <input type="hidden" name="__VIEWSTATE" value="vs-abc" />
          <input type="hidden" name="__VIEWSTATEGENERATOR" value="C2EE9ABB" />
          <input type="hidden" name="__EVENTVALIDATION" value="ev-123" />
          <input type="hidden" name="trackingPixel" value="ignored" />
          <input name="tbParcel" type="text" />
          <input type="submit" name="btnSubmit" value="Submit" />
        </form></body></html>"#;

    #[test]
    fn extracts_state_tokens_and_action() {
        let config = ClientConfig::default();
        let tokens = extract_tokens(SEARCH_PAGE, &page_url(), &config).unwrap();
        assert_eq!(tokens.get("__VIEWSTATE"), Some("vs-abc"));
        assert_eq!(tokens.get("__EVENTVALIDATION"), Some("ev-123"));
        assert_eq!(tokens.get("trackingPixel"), None);
        let names: Vec<&str> = tokens.fields().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["__VIEWSTATE", "__VIEWSTATEGENERATOR", "__EVENTVALIDATION"]);
        assert_eq!(tokens.action.as_str(), "https://assessor.example/AssessorParcelDetail/pcl.aspx");

        let (_, body) = tokens.into_submission("138-04-305-011", &config);
        assert!(body.contains(&("tbParcel".to_string(), "138-04-305-011".to_string())));
        assert!(body.contains(&("r1".to_string(), "pcl7".to_string())));
        assert!(body.contains(&("__VIEWSTATEGENERATOR".to_string(), "C2EE9ABB".to_string())));
    }

    #[test]
    fn missing_form_is_page_load_failure() {
        let err = extract_tokens("<html><body>Service unavailable</body></html>", &page_url(), &ClientConfig::default())
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::PageLoadFailed);
    }

    #[test]
    fn missing_viewstate_is_token_failure() {
        let html = r#"<form><input name="tbParcel" /><input type="hidden" name="__EVENTVALIDATION" value="x"/></form>"#;
        let err = extract_tokens(html, &page_url(), &ClientConfig::default()).unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::TokenMissing);
    }

    #[test]
    fn detail_url_is_detail() {
        let url = Url::parse("https://assessor.example/AssessorParcelDetail/ParcelDetail.aspx?hdnParcel=13804305011").unwrap();
        assert_eq!(classify_landing("<html></html>", &url, "ParcelDetail.aspx"), Landing::Detail);
    }

    #[test]
    fn javascript_redirect_is_followed() {
        let html = r#"<html><script>window.location.href = 'ParcelDetail.aspx?hdnParcel=13804305011';</script></html>"#;
        match classify_landing(html, &page_url(), "ParcelDetail.aspx") {
            Landing::Redirect(url) => assert_eq!(
                url.as_str(),
                "https://assessor.example/AssessorParcelDetail/ParcelDetail.aspx?hdnParcel=13804305011"
            ),
            other => panic!("unexpected landing {:?}", other),
        }
    }

    #[test]
    fn meta_refresh_is_followed() {
        let html = r#"<html><head><meta http-equiv="Refresh" content="0; URL=/assessor/ParcelDetail.aspx?p=1"></head></html>"#;
        assert!(matches!(classify_landing(html, &page_url(), "ParcelDetail.aspx"), Landing::Redirect(_)));
    }

    #[test]
    fn auto_submit_form_is_followed() {
        let html = r#"<html><body onload="document.forms[0].submit()">
            <form method="post" action="ParcelDetail.aspx?hdnParcel=13804305011">
              <input type="hidden" name="__VIEWSTATE" value="vs" />
            </form></body></html>"#;
        match classify_landing(html, &page_url(), "ParcelDetail.aspx") {
            Landing::Redirect(url) => assert_eq!(
                url.as_str(),
                "https://assessor.example/AssessorParcelDetail/ParcelDetail.aspx?hdnParcel=13804305011"
            ),
            other => panic!("unexpected landing {:?}", other),
        }
    }

    #[test]
    fn duplicate_links_collapse_to_one_choice() {
        let html = r#"<html><body><table>
            <tr><td><a href="ParcelDetail.aspx?p=13804305011">138-04-305-011</a></td>
                <td><a href="ParcelDetail.aspx?p=13804305011">view</a></td></tr>
            <tr><td><a href="help.aspx">help</a></td></tr>
            </table></body></html>"#;
        match classify_landing(html, &page_url(), "ParcelDetail.aspx") {
            Landing::Choices(choices) => assert_eq!(choices.len(), 1),
            other => panic!("unexpected landing {:?}", other),
        }
    }

    #[test]
    fn page_without_links_has_no_choices() {
        let html = "<html><body><span>No parcel found for that number.</span></body></html>";
        assert_eq!(classify_landing(html, &page_url(), "ParcelDetail.aspx"), Landing::Choices(vec![]));
    }
}
