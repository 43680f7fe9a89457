use actix_web::{App, HttpServer, Scope};

//Serves the given scope on an ephemeral localhost port, requires an actix runtime
pub fn serve<F>(scope: F) -> String
where
    F: Fn() -> Scope + Send + Clone + 'static,
{
    let server = HttpServer::new(move || App::new().service(scope()))
        .workers(1)
        .disable_signals()
        .bind(("127.0.0.1", 0))
        .expect("Error binding test server");

    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());

    format!("http://{}", addr)
}
