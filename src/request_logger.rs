use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Status;
use rocket::{Data, Request, Response};
use std::time::{Duration, Instant};

/// Request arrival time, kept in the request-local cache.
struct RequestStart(Instant);

/// Fairing to log one line per HTTP request with timing.
///
/// Server errors are logged at `warn` so they survive a quieter filter.
pub struct RequestLogger;

fn format_line(method: &str, uri: &str, status: Status, elapsed: Duration) -> String {
    format!(
        "{} {} -> {} ({:.2}ms)",
        method,
        uri,
        status.code,
        elapsed.as_secs_f64() * 1000.0
    )
}

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        request.local_cache(|| RequestStart(Instant::now()));
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let started = request.local_cache(|| RequestStart(Instant::now()));
        let status = response.status();
        let line = format_line(
            request.method().as_str(),
            &request.uri().to_string(),
            status,
            started.0.elapsed(),
        );

        if status.code >= 500 {
            log::warn!("{}", line);
        } else {
            log::info!("{}", line);
        }
    }
}
