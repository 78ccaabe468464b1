use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::error::RechargeError;
use crate::error::Result;

/// HTTP methods understood by the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A request as submitted by a caller: method, path, optional JSON body and
/// header overrides.
///
/// `path` is relative to the client's base URL and may carry a query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serializes `payload` as the JSON body.
    pub fn with_json<T>(self, payload: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_value(payload)
            .map_err(|err| RechargeError::InvalidRequest(err.to_string()))?;
        Ok(self.with_body(body))
    }

    /// Appends `params` to the path as a query string.
    pub fn with_query<P>(mut self, params: &P) -> Result<Self>
    where
        P: Serialize + ?Sized,
    {
        let query = query_string(params)?;
        if !query.is_empty() {
            let separator = if self.path.contains('?') { '&' } else { '?' };
            self.path.push(separator);
            self.path.push_str(&query);
        }
        Ok(self)
    }

    /// Overrides (or adds) a header for this request only.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Renders list/filter parameters as `key=value` pairs joined by `&`.
///
/// `params` must serialize to a JSON object (or nothing). `null` fields are
/// skipped and array values are comma-joined. Each value is form-encoded, the
/// joining commas are not.
pub fn query_string<P>(params: &P) -> Result<String>
where
    P: Serialize + ?Sized,
{
    let value =
        serde_json::to_value(params).map_err(|err| RechargeError::InvalidRequest(err.to_string()))?;
    let map = match value {
        Value::Null => return Ok(String::new()),
        Value::Object(map) => map,
        other => {
            return Err(RechargeError::InvalidRequest(format!(
                "query parameters must be an object, got {other}"
            )));
        }
    };

    let pairs: Vec<String> = map
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let rendered = match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| encode(&scalar(item)))
                    .collect::<Vec<_>>()
                    .join(","),
                other => encode(&scalar(other)),
            };
            format!("{}={}", encode(key), rendered)
        })
        .collect();
    Ok(pairs.join("&"))
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn encode(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}
