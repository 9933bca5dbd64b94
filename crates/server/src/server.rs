use axum::{Router, response::Html, routing::get};
use stratamem_shared::{APP_ENV, AppError};
use tokio::net::TcpListener;

use crate::{
  api,
  utils::{AppState, shutdown_signal},
};

#[axum::debug_handler]
async fn handler() -> Html<&'static str> {
  Html("<h1>Stratamem</h1>")
}

pub async fn server(state: AppState) -> Result<(), AppError> {
  let app = Router::new()
    .route("/", get(handler))
    .merge(api::app())
    .with_state(state);

  let listener = TcpListener::bind(APP_ENV.server_addr.as_str()).await?;

  tracing::info!("server started at http://{}", APP_ENV.server_addr);

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  Ok(())
}
