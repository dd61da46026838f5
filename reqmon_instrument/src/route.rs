use http::Method;

/// Entity name used when a request did not match any route
pub const UNKNOWN_ENTITY: &str = "UNKNOWN";

pub const REQUEST_PREFIX: &str = "request";
pub const RESPONSE_PREFIX: &str = "response";

/// The route a request was dispatched to, as resolved by the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// Name given to the route, e.g. `make`
    url_name: Option<String>,
    /// Name of the handler, e.g. `styling/{id}/make`
    view_name: String,
    /// Module the handler lives in
    module: String,
    /// Function name of the handler
    func: String,
}

impl RouteMatch {
    pub fn new(
        view_name: impl Into<String>,
        module: impl Into<String>,
        func: impl Into<String>,
    ) -> Self {
        Self {
            url_name: None,
            view_name: view_name.into(),
            module: module.into(),
            func: func.into(),
        }
    }

    pub fn with_url_name(self, url_name: impl Into<String>) -> Self {
        Self {
            url_name: Some(url_name.into()),
            ..self
        }
    }

    pub fn url_name(&self) -> Option<&str> {
        self.url_name.as_deref()
    }

    pub fn view_name(&self) -> &str {
        &self.view_name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn func(&self) -> &str {
        &self.func
    }

    /// The sanitized url name, falling back to the view name
    pub fn entity_name(&self) -> String {
        let name = self
            .url_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.view_name);
        let entity = sanitize_entity_name(name);
        if entity.is_empty() {
            UNKNOWN_ENTITY.to_string()
        } else {
            entity
        }
    }
}

/// Turn a route name into a metric name segment
///
/// `-` becomes `_`, `/` becomes `.`, `{` and `}` become `_`, and leading or trailing `.`
/// are removed. Applying it to its own output is a no-op.
pub fn sanitize_entity_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '-' | '{' | '}' => '_',
            '/' => '.',
            c => c,
        })
        .collect();
    replaced.trim_matches('.').to_string()
}

/// What the instrumentation needs to know about an inbound request
#[derive(Debug, Clone)]
pub struct RequestInfo {
    method: Method,
    url: String,
    route: Option<RouteMatch>,
}

impl RequestInfo {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            route: None,
        }
    }

    pub fn with_route(self, route: RouteMatch) -> Self {
        Self {
            route: Some(route),
            ..self
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn route(&self) -> Option<&RouteMatch> {
        self.route.as_ref()
    }

    /// The entity name of the matched route, [`UNKNOWN_ENTITY`] if there is none
    pub fn entity_name(&self) -> String {
        match &self.route {
            Some(route) => route.entity_name(),
            None => UNKNOWN_ENTITY.to_string(),
        }
    }

    /// `request.<entity>.<method>`
    pub fn request_metric_name(&self) -> String {
        format!("{REQUEST_PREFIX}.{}.{}", self.entity_name(), self.method)
    }

    /// `response.<entity>.<method>.<status>`
    pub fn response_metric_name(&self, status: u16) -> String {
        format!(
            "{RESPONSE_PREFIX}.{}.{}.{status}",
            self.entity_name(),
            self.method
        )
    }
}

/// Status codes in `400..=599` count as errors
pub fn is_error_status(status: u16) -> bool {
    (400..=599).contains(&status)
}
