pub mod kube_canonical;
pub mod kube_micro;
pub mod local_container;
pub mod public_cloud;

pub use kube_canonical::KubeCanonical;
pub use kube_micro::KubeMicro;
pub use local_container::LocalContainer;
pub use public_cloud::PublicCloud;
