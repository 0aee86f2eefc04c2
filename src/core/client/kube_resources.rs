/// Re-export the Kubernetes resource types the scaler reads from k8s-openapi
/// so the rest of the crate has one place to import them from.

pub use k8s_openapi::api::core::v1::{
    EndpointAddress,
    EndpointPort,
    EndpointSubset,
    Endpoints,
};

pub use k8s_openapi::api::apps::v1::{
    Deployment,
    DeploymentSpec,
};

pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector,
    ObjectMeta,
};
