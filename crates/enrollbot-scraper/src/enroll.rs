//! Two-step scrape of the enrollment status form.

use async_trait::async_trait;
use enrollbot_core::config::ScraperSettings;
use enrollbot_core::error::{EnrollBotError, Result, ScrapeError};
use enrollbot_core::traits::StatusScraper;
use scraper::{Html, Selector};
use std::time::Duration;

const TOKEN_FIELD: &str = "__RequestVerificationToken";
const TOKEN_SELECTOR: &str = r#"input[name="__RequestVerificationToken"]"#;
const RESULT_SELECTOR: &str = r#"[class*="validation-summary-errors"] li"#;

/// Scraper for the enrollment status page.
pub struct EnrollScraper {
    client: reqwest::Client,
    url: String,
}

impl EnrollScraper {
    pub fn new(settings: &ScraperSettings) -> Result<Self> {
        // The anti-forgery token is paired with a cookie set on the GET.
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| EnrollBotError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: settings.url.clone(),
        })
    }

    async fn read_body(
        &self,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<String, ScrapeError> {
        let response = request
            .send()
            .await
            .map_err(|e| ScrapeError::Http(format!("request failed: {e}")))?
            .error_for_status()
            .map_err(|e| ScrapeError::Http(e.to_string()))?;
        response
            .text()
            .await
            .map_err(|e| ScrapeError::Http(format!("response read failed: {e}")))
    }
}

#[async_trait]
impl StatusScraper for EnrollScraper {
    async fn fetch_form_token(&self) -> std::result::Result<String, ScrapeError> {
        let html = self.read_body(self.client.get(&self.url)).await?;
        tracing::debug!(bytes = html.len(), "status form loaded");
        parse_form_token(&html).ok_or(ScrapeError::MissingToken)
    }

    async fn submit(
        &self,
        token: &str,
        request_number: &str,
        pin_code: &str,
    ) -> std::result::Result<String, ScrapeError> {
        let form = [
            (TOKEN_FIELD, token),
            ("reqNum", request_number),
            ("pin", pin_code),
        ];
        let html = self.read_body(self.client.post(&self.url).form(&form)).await?;
        tracing::debug!(bytes = html.len(), request_number, "status form submitted");
        Ok(html)
    }

    fn extract_result(&self, raw_response: &str) -> std::result::Result<String, ScrapeError> {
        parse_result(raw_response).ok_or(ScrapeError::MissingResult)
    }
}

/// Value of the anti-forgery token input, if present.
pub fn parse_form_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(TOKEN_SELECTOR).ok()?;
    document
        .select(&selector)
        .next()?
        .value()
        .attr("value")
        .map(str::to_string)
}

/// Text of the first validation summary item, if present and non-empty.
pub fn parse_result(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(RESULT_SELECTOR).ok()?;
    let item = document.select(&selector).next()?;
    let text = item.text().collect::<String>();
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() { None } else { Some(text) }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORM_HTML: &str = r#"<!DOCTYPE html>
<html><body>
<form action="/BgInfo/Home/Enroll" method="post">
    <input name="__RequestVerificationToken" type="hidden" value="CfDJ8-token-value" />
    <input id="reqNum" name="reqNum" type="text" value="" />
    <input id="pin" name="pin" type="password" />
</form>
</body></html>"#;

    const RESULT_HTML: &str = r#"<!DOCTYPE html>
<html><body>
<div class="validation-summary-errors text-danger" data-valmsg-summary="true">
    <ul>
        <li>Преписката е в процес
            на обработка</li>
        <li>second</li>
    </ul>
</div>
</body></html>"#;

    #[test]
    fn test_parse_form_token() {
        assert_eq!(
            parse_form_token(FORM_HTML).as_deref(),
            Some("CfDJ8-token-value")
        );
    }

    #[test]
    fn test_missing_token() {
        assert!(parse_form_token("<html><body><form></form></body></html>").is_none());
    }

    #[test]
    fn test_parse_result_first_item_normalised() {
        assert_eq!(
            parse_result(RESULT_HTML).as_deref(),
            Some("Преписката е в процес на обработка")
        );
    }

    #[test]
    fn test_missing_result() {
        assert!(parse_result(FORM_HTML).is_none());
        let empty = r#"<div class="validation-summary-errors"><ul><li>  </li></ul></div>"#;
        assert!(parse_result(empty).is_none());
    }

    #[test]
    fn test_extract_result_maps_to_error() {
        let scraper = EnrollScraper::new(&ScraperSettings::default()).unwrap();
        assert_eq!(
            scraper.extract_result(FORM_HTML),
            Err(ScrapeError::MissingResult)
        );
        assert!(scraper.extract_result(RESULT_HTML).is_ok());
    }
}
