use std::sync::Arc;
use std::time::Duration;

use storefront_cart::api::repository::MemoryCartRepository;
use storefront_cart::api::{self, AppState};
use storefront_cart::store::HttpCartApi;
use storefront_cart::RateConfig;

pub struct TestServer {
    pub base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        // Same router as the binary, in-memory repository, ephemeral port.
        let state = AppState::new(Arc::new(MemoryCartRepository::new()), Arc::new(RateConfig::default()));
        let app = api::router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    pub fn client(&self) -> HttpCartApi {
        HttpCartApi::new(self.base_url.clone(), Duration::from_secs(5)).unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
