#![allow(dead_code)]

use async_trait::async_trait;
use mockall::mock;
use serde_json::Value;
use truenas_config_backup::error::RemoteError;
use truenas_config_backup::truenas::{Connector, Session};

mock! {
    pub Connector {}

    #[async_trait]
    impl Connector for Connector {
        async fn connect(&self, host: &str, verify_tls: bool) -> Result<Box<dyn Session>, RemoteError>;
    }
}

mock! {
    pub Session {}

    #[async_trait]
    impl Session for Session {
        async fn authenticate(&mut self, api_key: &str) -> Result<(), RemoteError>;
        async fn call(&mut self, method: &str, params: Value) -> Result<Vec<u8>, RemoteError>;
        async fn close(&mut self) -> Result<(), RemoteError>;
    }
}
