//! Thin wrappers over the product, plan and subscription endpoints.
//!
//! Payloads are passed through as JSON; the API owns their schemas.

use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::client::RechargeClient;
use crate::error::Result;
use crate::request::RequestDescriptor;

#[derive(Debug, Clone, Copy)]
pub struct Products<'a> {
    client: &'a RechargeClient,
}

impl<'a> Products<'a> {
    pub(crate) fn new(client: &'a RechargeClient) -> Self {
        Self { client }
    }

    pub async fn create<T>(&self, product: &T) -> Result<Value>
    where
        T: Serialize + ?Sized,
    {
        let descriptor = RequestDescriptor::post("/products").with_json(product)?;
        self.client.request_json(descriptor, None).await
    }

    pub async fn get(&self, id: &str) -> Result<Value> {
        self.client
            .request_json(RequestDescriptor::get(format!("/products/{id}")), None)
            .await
    }

    pub async fn update<T>(&self, id: &str, changes: &T) -> Result<Value>
    where
        T: Serialize + ?Sized,
    {
        let descriptor = RequestDescriptor::put(format!("/products/{id}")).with_json(changes)?;
        self.client.request_json(descriptor, None).await
    }

    /// Returns the deleted product, or `null` on a no-content reply.
    pub async fn delete(&self, id: &str) -> Result<Value> {
        self.client
            .request_json(RequestDescriptor::delete(format!("/products/{id}")), None)
            .await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Plans<'a> {
    client: &'a RechargeClient,
}

impl<'a> Plans<'a> {
    pub(crate) fn new(client: &'a RechargeClient) -> Self {
        Self { client }
    }

    pub async fn create<T>(&self, plan: &T) -> Result<Value>
    where
        T: Serialize + ?Sized,
    {
        let descriptor = RequestDescriptor::post("/plans").with_json(plan)?;
        self.client.request_json(descriptor, Some("plan")).await
    }

    pub async fn get(&self, id: u64) -> Result<Value> {
        self.client
            .request_json(RequestDescriptor::get(format!("/plans/{id}")), None)
            .await
    }

    /// Lists plans matching `params`, e.g. `external_product_id` or `ids`.
    pub async fn list<P>(&self, params: &P) -> Result<Vec<Value>>
    where
        P: Serialize + ?Sized,
    {
        let descriptor = RequestDescriptor::get("/plans").with_query(params)?;
        self.client.request_json(descriptor, Some("plans")).await
    }

    pub async fn update<T>(&self, id: u64, changes: &T) -> Result<Value>
    where
        T: Serialize + ?Sized,
    {
        let descriptor = RequestDescriptor::put(format!("/plans/{id}")).with_json(changes)?;
        self.client.request_json(descriptor, Some("plan")).await
    }

    /// Returns the status of the reply, usually `204`.
    pub async fn delete(&self, id: u64) -> Result<u16> {
        let response = self
            .client
            .request(RequestDescriptor::delete(format!("/plans/{id}")))
            .await?;
        Ok(response.status().unwrap_or(200))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Subscriptions<'a> {
    client: &'a RechargeClient,
}

impl<'a> Subscriptions<'a> {
    pub(crate) fn new(client: &'a RechargeClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, id: u64) -> Result<Value> {
        self.client
            .request_json(
                RequestDescriptor::get(format!("/subscriptions/{id}")),
                Some("subscription"),
            )
            .await
    }

    pub async fn list<P>(&self, params: &P) -> Result<Vec<Value>>
    where
        P: Serialize + ?Sized,
    {
        let descriptor = RequestDescriptor::get("/subscriptions").with_query(params)?;
        self.client.request_json(descriptor, Some("subscriptions")).await
    }

    pub async fn update<T>(&self, id: u64, changes: &T) -> Result<Value>
    where
        T: Serialize + ?Sized,
    {
        let descriptor =
            RequestDescriptor::put(format!("/subscriptions/{id}")).with_json(changes)?;
        self.client.request_json(descriptor, Some("subscription")).await
    }

    /// Moves a subscription onto another storefront product and variant.
    pub async fn swap_product(&self, id: u64, product_id: &str, variant_id: &str) -> Result<Value> {
        self.update(
            id,
            &json!({
                "external_product_id": { "ecommerce": product_id },
                "external_variant_id": { "ecommerce": variant_id },
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use serde_json::json;
    use tower::BoxError;
    use tower::service_fn;

    use super::*;
    use crate::config::ClientConfig;
    use crate::error::RechargeError;
    use crate::request::Method;
    use crate::transport::TransportRequest;
    use crate::transport::TransportResponse;

    type Seen = Arc<Mutex<Vec<TransportRequest>>>;

    fn client_replying(response: TransportResponse) -> (RechargeClient, Seen) {
        let seen: Seen = Arc::default();
        let log = seen.clone();
        let transport = service_fn(move |req: TransportRequest| {
            log.lock().unwrap().push(req);
            let response = response.clone();
            async move { Ok::<_, BoxError>(response) }
        });
        let config = ClientConfig::new("token").with_base_url("https://api.test");
        (RechargeClient::with_transport(config, transport).unwrap(), seen)
    }

    fn body_of(request: &TransportRequest) -> Value {
        serde_json::from_slice(request.body.as_deref().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn plan_create_unwraps_the_plan() {
        let (client, seen) =
            client_replying(TransportResponse::json(201, &json!({"plan": {"id": 9}})));

        let plan = client
            .plans()
            .create(&json!({"title": "Monthly", "type": "subscription"}))
            .await
            .unwrap();
        assert_eq!(plan, json!({"id": 9}));

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].method, Method::Post);
        assert_eq!(seen[0].url, "https://api.test/plans");
        assert_eq!(body_of(&seen[0])["title"], "Monthly");
    }

    #[tokio::test]
    async fn plan_list_builds_the_query() {
        let (client, seen) = client_replying(TransportResponse::json(
            200,
            &json!({"plans": [{"id": 1}, {"id": 2}]}),
        ));

        let plans = client
            .plans()
            .list(&json!({"external_product_id": "p1", "ids": [1, 2]}))
            .await
            .unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(
            seen.lock().unwrap()[0].url,
            "https://api.test/plans?external_product_id=p1&ids=1,2"
        );
    }

    #[tokio::test]
    async fn plan_delete_reports_the_bare_status() {
        let (client, seen) = client_replying(TransportResponse::no_content());
        assert_eq!(client.plans().delete(4).await, Ok(204));
        assert_eq!(seen.lock().unwrap()[0].method, Method::Delete);
    }

    #[tokio::test]
    async fn product_get_returns_the_whole_body() {
        let body = json!({"external_product_id": "abc", "title": "Coffee"});
        let (client, seen) = client_replying(TransportResponse::json(200, &body));

        assert_eq!(client.products().get("abc").await, Ok(body));
        assert_eq!(seen.lock().unwrap()[0].url, "https://api.test/products/abc");
    }

    #[tokio::test]
    async fn subscription_update_targets_the_subscription() {
        let (client, seen) = client_replying(TransportResponse::json(
            200,
            &json!({"subscription": {"id": 12, "quantity": 2}}),
        ));

        let updated = client
            .subscriptions()
            .update(12, &json!({"quantity": 2}))
            .await
            .unwrap();
        assert_eq!(updated["quantity"], 2);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].method, Method::Put);
        assert_eq!(seen[0].url, "https://api.test/subscriptions/12");
    }

    #[tokio::test]
    async fn swap_product_sends_storefront_ids() {
        let (client, seen) =
            client_replying(TransportResponse::json(200, &json!({"subscription": {"id": 3}})));

        client
            .subscriptions()
            .swap_product(3, "prod-9", "var-4")
            .await
            .unwrap();

        assert_eq!(
            body_of(&seen.lock().unwrap()[0]),
            json!({
                "external_product_id": {"ecommerce": "prod-9"},
                "external_variant_id": {"ecommerce": "var-4"},
            })
        );
    }

    #[tokio::test]
    async fn missing_wrapper_field_is_reported() {
        let (client, _) = client_replying(TransportResponse::json(200, &json!({"id": 5})));
        assert!(matches!(
            client.subscriptions().get(5).await,
            Err(RechargeError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn api_errors_pass_through() {
        let (client, _) = client_replying(TransportResponse::json(
            422,
            &json!({"errors": {"interval_unit": ["is not included in the list"]}}),
        ));
        let err = client
            .plans()
            .update(1, &json!({"interval_unit": "fortnight"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "interval_unit: is not included in the list");
    }
}
