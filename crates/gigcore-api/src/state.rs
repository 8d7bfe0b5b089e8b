use std::sync::Arc;

use gigcore_store::Store;

/// Bundles the store handle and the few externally-supplied secrets the
/// HTTP surface needs, mirrored from `chronx-rpc`'s `RpcServerState`.
pub struct ApiState {
    pub store: Arc<Store>,
    pub stripe_webhook_secret: String,
}
