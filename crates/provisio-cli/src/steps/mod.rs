//! The provisioning steps, in the order they must run.

mod admin;
mod branding;
mod database;
mod extras;
mod finish;
mod geo;
mod plugins;
mod prepare;
mod privacy;
mod schema;
mod site;

pub use admin::CreateAdminUser;
pub use branding::SetBranding;
pub use database::ConnectDatabase;
pub use extras::{SetConfigExtras, SetOptionExtras};
pub use finish::Finish;
pub use geo::SetGeoProvider;
pub use plugins::{DeactivatePlugins, SetPluginSettings, SetupPlugins};
pub use prepare::Prepare;
pub use privacy::SetPrivacy;
pub use schema::CreateSchema;
pub use site::AddPrimarySite;

use crate::workflow::Step;

/// Later steps assume every earlier one succeeded.
pub fn default_steps() -> Vec<Box<dyn Step>> {
    vec![
        Box::new(Prepare),
        Box::new(ConnectDatabase),
        Box::new(CreateSchema),
        Box::new(CreateAdminUser),
        Box::new(AddPrimarySite),
        Box::new(Finish),
        Box::new(SetGeoProvider),
        Box::new(SetPrivacy),
        Box::new(SetupPlugins),
        Box::new(SetConfigExtras),
        Box::new(SetOptionExtras),
        Box::new(DeactivatePlugins),
        Box::new(SetBranding),
        Box::new(SetPluginSettings),
    ]
}
