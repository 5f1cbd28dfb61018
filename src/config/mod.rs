mod settings;

pub use settings::{Deployment, MongoConfig, Settings};
