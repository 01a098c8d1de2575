use oso::PolarClass;
use serde::{Deserialize, Serialize};

/// The marketplace itself, the resource for actions that do not target an
/// existing record.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Platform;

impl PolarClass for Platform {
    fn get_polar_class_builder() -> oso::ClassBuilder<Platform> {
        oso::Class::builder()
            .name("Platform")
            .add_class_method("default", Platform::default)
    }

    fn get_polar_class() -> oso::Class {
        let builder = Platform::get_polar_class_builder();
        builder.build()
    }
}
