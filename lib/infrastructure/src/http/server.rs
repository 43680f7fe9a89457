use actix_web::{App, HttpServer, Scope, error, web};
use anyhow::Context as _;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct HttpServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    pub port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

//Rejected JSON bodies are answered with 400 and the parser message
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, req| {
        tracing::warn!("Invalid JSON body for {}: {}", req.path(), err);
        let message = err.to_string();
        error::InternalError::from_response(err, actix_web::HttpResponse::BadRequest().body(message)).into()
    })
}

impl HttpServerConfig {
    pub async fn run_server<F>(&self, scopes: F) -> anyhow::Result<()>
    where
        F: Fn() -> Vec<Scope> + Send + Clone + 'static,
    {
        let http_server = HttpServer::new(move || {
            scopes().into_iter().fold(
                App::new()
                    .wrap(tracing_actix_web::TracingLogger::default())
                    .app_data(json_config()),
                |app, scope| app.service(scope),
            )
        })
        .workers(1)
        .disable_signals()
        .bind((self.bind_address.as_str(), self.port))
        .with_context(|| format!("Error binding HTTP server to {}:{}", self.bind_address, self.port))?;

        tracing::info!("HTTP server listening on {}:{}", self.bind_address, self.port);

        http_server
            .run()
            .await
            .with_context(|| format!("Error running HTTP server on port {}", self.port))
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{HttpResponse, http::StatusCode, test};

    use super::*;

    #[derive(Deserialize)]
    struct Body {
        #[allow(dead_code)]
        port: u16,
    }

    #[actix_web::test]
    async fn test_malformed_json_is_bad_request() {
        let app = test::init_service(App::new().app_data(json_config()).route(
            "/echo",
            web::post().to(|_: web::Json<Body>| async { HttpResponse::Ok().finish() }),
        ))
        .await;

        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/echo")
                .insert_header(("content-type", "application/json"))
                .set_payload("{\"port\": \"x\"}")
                .to_request(),
        )
        .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
