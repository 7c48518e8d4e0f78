//! Static component registry, defined once at process start.

use crate::component::{AccelDriver, Component, ContainerRuntime, GpuDriver, GpuToolkit};
use crate::config::HostctlConfig;

pub struct Registry {
    components: Vec<Box<dyn Component>>,
}

impl Registry {
    /// The components hostctl manages, in status-report order.
    pub fn standard(cfg: &HostctlConfig) -> Self {
        Self {
            components: vec![
                Box::new(AccelDriver::new(&cfg.accel)),
                Box::new(GpuDriver::new(&cfg.gpu)),
                Box::new(ContainerRuntime::new()),
                Box::new(GpuToolkit::new()),
            ],
        }
    }

    #[cfg(test)]
    pub fn from_components(components: Vec<Box<dyn Component>>) -> Self {
        Self { components }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Component> {
        self.components
            .iter()
            .map(AsRef::as_ref)
            .find(|c| c.name() == name)
    }

    pub fn components(&self) -> Vec<&dyn Component> {
        self.components.iter().map(AsRef::as_ref).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.components.iter().map(|c| c.name()).collect()
    }
}
