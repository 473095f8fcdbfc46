pub mod credentials;
pub mod http;
pub mod lro;
pub mod management_client;

pub use credentials::{
    AccessToken, AzureCliCredential, ChainedCredential, ClientSecretCredential,
    StaticTokenCredential, TokenCredential,
};
pub use http::{HttpBody, HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use lro::LroPoller;
pub use management_client::{edge_resource_id, ArmClient, ArmEndpoint, ManagementClient};
