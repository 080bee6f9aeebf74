//! `roomkey request`: send one authenticated API request.

use colored::Colorize;

use crate::commands::Context;
use crate::error::{Result, RoomkeyError};
use crate::transport::{ApiRequest, Method};

/// Builds the request described on the command line.
///
/// # Errors
///
/// Returns a configuration error for an unknown method or a body that is
/// not valid JSON.
pub fn build_request(method: &str, path: &str, data: Option<&str>) -> Result<ApiRequest> {
    let method = match method.to_uppercase().as_str() {
        "GET" => Method::GET,
        "POST" => Method::POST,
        "PUT" => Method::PUT,
        "PATCH" => Method::PATCH,
        "DELETE" => Method::DELETE,
        other => {
            return Err(RoomkeyError::Config(format!(
                "Unsupported method: {}. Must be one of: GET, POST, PUT, PATCH, DELETE",
                other
            ))
            .into())
        }
    };

    let mut request = ApiRequest::new(method, path);
    if let Some(data) = data {
        let body: serde_json::Value = serde_json::from_str(data)
            .map_err(|e| RoomkeyError::Config(format!("--data is not valid JSON: {}", e)))?;
        request = request.json(body);
    }
    Ok(request)
}

/// Pretty-prints JSON bodies and passes anything else through.
pub fn render_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| body.to_string())
}

/// Dispatch a request and print the response body.
pub async fn run_request(ctx: &Context, method: &str, path: &str, data: Option<&str>) -> Result<()> {
    let request = build_request(method, path, data)?;

    match ctx.authenticator().dispatch(request).await {
        Ok(response) => {
            println!("{}", render_body(&response.body));
            Ok(())
        }
        Err(e) if e.is_authentication() => {
            eprintln!(
                "{} Use {} to sign in again.",
                "Session expired.".red(),
                "roomkey login".cyan()
            );
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}
