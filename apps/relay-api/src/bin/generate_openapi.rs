use utoipa::OpenApi;

fn main() {
    let spec = relay_api::routes::ApiDoc::openapi()
        .to_pretty_json()
        .expect("openapi document serializes");
    let out = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../specs/relay-api.json");
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).expect("create specs directory");
    }
    std::fs::write(&out, spec).expect("write openapi document");
    println!("Wrote {}", out.display());
}
