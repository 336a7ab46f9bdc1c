#[tokio::main]
async fn main() {
    rag_box_lib::run().await
}
