//! `test-utils` is used for testing in both `hostgate-lib` and `hostgate`.
//! This crate does not depend on either of them, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies
//! (`wiremock`, `http` and `url`).

/// Create a mock web server, which responds with a predefined status when
/// handling a matching request
#[macro_export]
macro_rules! mock_server {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new(http::StatusCode::from($status));
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::method("GET")).respond_with(template).mount(&mock_server).await;
        mock_server
    }};
}

/// Create a mock web server which answers every `GET` with `200 OK` and the
/// given raw body.
#[macro_export]
macro_rules! mock_body {
    ($body:expr) => {{
        let mock_server = wiremock::MockServer::start().await;
        let template = wiremock::ResponseTemplate::new(200).set_body_bytes($body);
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(template)
            .mount(&mock_server)
            .await;
        mock_server
    }};
}

/// Create a mock web server which holds every response back for the given
/// [`std::time::Duration`] before answering with `200 OK`.
#[macro_export]
macro_rules! slow_mock_server {
    ($delay:expr) => {{
        let mock_server = wiremock::MockServer::start().await;
        let template = wiremock::ResponseTemplate::new(200)
            .set_body_string("slow")
            .set_delay($delay);
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(template)
            .mount(&mock_server)
            .await;
        mock_server
    }};
}

/// Set up a mock server which has two routes: `/ok` and `/redirect`.
/// Calling `/redirect` returns a HTTP Location header redirecting to `/ok`.
/// Evaluates to `(server, redirect_url, ok_url)`.
#[macro_export]
macro_rules! redirecting_mock_server {
    () => {{
        let mock_server = wiremock::MockServer::start().await;
        let ok_url = url::Url::parse(&format!("{}/ok", mock_server.uri())).unwrap();
        let redirect_url = url::Url::parse(&format!("{}/redirect", mock_server.uri())).unwrap();

        let redirect = wiremock::ResponseTemplate::new(http::StatusCode::FOUND)
            .insert_header("Location", ok_url.as_str());
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/redirect"))
            .respond_with(redirect)
            .mount(&mock_server)
            .await;

        let ok = wiremock::ResponseTemplate::new(http::StatusCode::OK).set_body_string("landed");
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/ok"))
            .respond_with(ok)
            .mount(&mock_server)
            .await;

        (mock_server, redirect_url, ok_url)
    }};
}

/// Gets the "main" binary name (e.g. `hostgate`)
#[macro_export]
macro_rules! main_command {
    () => {
        Command::cargo_bin(env!("CARGO_PKG_NAME")).expect("Couldn't get cargo package name")
    };
}
