#[tokio::main]
async fn main() {
    contact_desk::web::run().await;
}
