use dialer_api::router::ApiDoc;
use utoipa::OpenApi;

/// Writes the dialer's OpenAPI document to the path given as the first
/// argument, or `openapi.json` when none is given.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "openapi.json".to_string());
    let document = ApiDoc::openapi().to_pretty_json()?;
    std::fs::write(&path, document)?;
    println!("Wrote OpenAPI document to {path}");
    Ok(())
}
