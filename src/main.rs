#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    pestdocs_server::run().await
}
