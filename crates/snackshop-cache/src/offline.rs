//! Synthesized responses returned when both network and cache come up empty.

use crate::controller::{Response, ResponseSource};

/// JSON 503 returned for API requests that cannot be satisfied.
pub fn api_offline_response() -> Response {
    let body = serde_json::json!({
        "success": false,
        "message": "You are offline. Please check your internet connection.",
        "offline": true,
    });
    Response {
        status: 503,
        headers: vec![("content-type".into(), "application/json".into())],
        body: body.to_string().into_bytes(),
        source: ResponseSource::Synthesized,
    }
}

/// Plain-text 503 for static assets missing from every partition.
pub fn asset_offline_response() -> Response {
    plain_text_503("Offline - File not available")
}

/// Plain-text 503 for uncategorized requests.
pub fn generic_offline_response() -> Response {
    plain_text_503("Offline - Resource not available")
}

/// Self-contained offline page served for navigations, status 200 so the
/// shell renders it as a normal document.
pub fn navigation_offline_response() -> Response {
    Response {
        status: 200,
        headers: vec![("content-type".into(), "text/html".into())],
        body: OFFLINE_PAGE.as_bytes().to_vec(),
        source: ResponseSource::Synthesized,
    }
}

fn plain_text_503(message: &str) -> Response {
    Response {
        status: 503,
        headers: vec![("content-type".into(), "text/plain".into())],
        body: message.as_bytes().to_vec(),
        source: ResponseSource::Synthesized,
    }
}

const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <title>SnackShop - Offline</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>
      body { font-family: Arial, sans-serif; text-align: center; padding: 50px; background: #f8f9fa; }
      .offline-container { max-width: 400px; margin: 0 auto; background: white; padding: 40px;
        border-radius: 10px; box-shadow: 0 5px 20px rgba(0,0,0,0.1); }
      h1 { color: #2c5530; margin-bottom: 20px; }
      p { color: #666; margin-bottom: 30px; }
      .retry-btn { background: #4a7c59; color: white; padding: 12px 24px; border: none;
        border-radius: 6px; cursor: pointer; font-size: 16px; }
      .retry-btn:hover { background: #2c5530; }
    </style>
  </head>
  <body>
    <div class="offline-container">
      <h1>You're Offline</h1>
      <p>SnackShop is not available right now. Please check your internet connection and try again.</p>
      <button class="retry-btn" onclick="window.location.reload()">Try Again</button>
    </div>
  </body>
</html>
"#;
