//! Closure-backed local services.
//!
//! Lets an application publish a service by handing over one closure per verb
//! instead of implementing `RestService` by hand. Verbs without a closure fail
//! with `ServiceError::Unsupported`.

use std::sync::Arc;

use coapwire::Method;

use crate::service::RestService;
use crate::service::Result;
use crate::service::ServiceError;
use crate::urn::ServiceUrn;

type Handler = Arc<dyn Fn(Option<&[u8]>) -> Result<Option<Vec<u8>>> + Send + Sync>;

/// A local service handle built from closures.
#[derive(Clone)]
pub struct LocalService {
    identifier: ServiceUrn,
    get: Option<Handler>,
    put: Option<Handler>,
    post: Option<Handler>,
    delete: Option<Handler>,
}

impl LocalService {
    pub fn new(identifier: ServiceUrn) -> Self {
        Self {
            identifier,
            get: None,
            put: None,
            post: None,
            delete: None,
        }
    }

    pub fn on_get<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&[u8]>) -> Result<Option<Vec<u8>>> + Send + Sync + 'static,
    {
        self.get = Some(Arc::new(f));
        self
    }

    pub fn on_put<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&[u8]>) -> Result<Option<Vec<u8>>> + Send + Sync + 'static,
    {
        self.put = Some(Arc::new(f));
        self
    }

    pub fn on_post<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&[u8]>) -> Result<Option<Vec<u8>>> + Send + Sync + 'static,
    {
        self.post = Some(Arc::new(f));
        self
    }

    pub fn on_delete<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&[u8]>) -> Result<Option<Vec<u8>>> + Send + Sync + 'static,
    {
        self.delete = Some(Arc::new(f));
        self
    }

    fn run(&self, method: Method, handler: &Option<Handler>, input: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        match handler {
            Some(f) => f(input),
            None => Err(ServiceError::Unsupported(method)),
        }
    }
}

#[async_trait::async_trait]
impl RestService for LocalService {
    fn identifier(&self) -> &ServiceUrn {
        &self.identifier
    }

    async fn get(&self, input: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        self.run(Method::Get, &self.get, input)
    }

    async fn put(&self, input: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        self.run(Method::Put, &self.put, input)
    }

    async fn post(&self, input: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        self.run(Method::Post, &self.post, input)
    }

    async fn delete(&self, input: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        self.run(Method::Delete, &self.delete, input)
    }
}
