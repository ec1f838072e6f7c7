pub mod error;
pub mod middleware;
pub mod multipart;
pub mod routes;

pub type DeploymentImpl = local_deployment::LocalDeployment;
