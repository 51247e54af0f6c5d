use super::inject::{Component, Injectable, ParameterRegistry};
use super::kernel::KernelDriver;
use crate::assertion::{Assertion, Asserter, FailureHandler};
use crate::core::config::Config;
use crate::core::driver::{share, Driver};
use crate::errors::Result;
use crate::http::{HttpOptions, Kernel};
use crate::testing::{self, StateDump};
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use tracing::{debug, info};
use uuid::Uuid;

/// Fluent entry point over one driver. Every action returns `&Self` so calls
/// chain with `?`.
pub struct Browser<D: Driver> {
    id: String,
    driver: Rc<RefCell<D>>,
    config: Config,
    asserter: Asserter,
    registry: ParameterRegistry<D>,
}

impl<D: Driver> Browser<D> {
    pub fn new(driver: D, config: Config) -> Self {
        let driver = share(driver);
        let dump: Rc<RefCell<dyn StateDump>> = driver.clone();
        testing::register(Rc::downgrade(&dump), config.artifacts.clone());

        let id = Uuid::new_v4().to_string();
        info!(browser = %id, backend = driver.borrow().backend(), "browser created");
        Self {
            id,
            driver,
            config,
            asserter: Asserter::default(),
            registry: ParameterRegistry::with_defaults(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Borrows the driver. Do not hold the borrow across node operations,
    /// which borrow it again.
    pub fn driver(&self) -> Ref<'_, D> {
        self.driver.borrow()
    }

    pub fn driver_mut(&self) -> RefMut<'_, D> {
        self.driver.borrow_mut()
    }

    pub fn shared_driver(&self) -> Rc<RefCell<D>> {
        self.driver.clone()
    }

    pub fn with_handler(mut self, handler: Rc<dyn FailureHandler>) -> Self {
        self.asserter.set_handler(handler);
        self
    }

    pub fn set_handler(&mut self, handler: Rc<dyn FailureHandler>) -> &mut Self {
        self.asserter.set_handler(handler);
        self
    }

    pub fn asserter(&self) -> &Asserter {
        &self.asserter
    }

    /// Runs an assertion through this browser's failure handler.
    pub fn assert_that(&self, assertion: &dyn Assertion) -> Result<&Self> {
        self.asserter.check(assertion)?;
        Ok(self)
    }

    pub fn registry(&self) -> &ParameterRegistry<D> {
        &self.registry
    }

    /// Makes `T` injectable into `use_with` callbacks.
    pub fn register_parameter<T: 'static>(
        &mut self,
        factory: impl Fn(&Browser<D>) -> Result<T> + 'static,
    ) -> &mut Self {
        self.registry.register(factory);
        self
    }

    pub fn register_component<C: Component<D>>(&mut self) -> &mut Self {
        self.registry.register_component::<C>();
        self
    }

    /// Calls `callback` with this browser and the parameters its second
    /// argument asks for, built from the registry.
    pub fn use_with<P, R>(&self, callback: impl FnOnce(&Self, P) -> R) -> Result<R>
    where
        P: Injectable<D>,
    {
        let parameters = P::inject(self)?;
        Ok(callback(self, parameters))
    }

    pub fn start(&self) -> Result<&Self> {
        self.driver.borrow_mut().start()?;
        Ok(self)
    }

    pub fn stop(&self) -> Result<&Self> {
        self.driver.borrow_mut().stop()?;
        Ok(self)
    }

    pub fn reset(&self) -> Result<&Self> {
        debug!(browser = %self.id, "reset");
        self.driver.borrow_mut().reset()?;
        Ok(self)
    }

    pub fn is_started(&self) -> bool {
        self.driver.borrow().is_started()
    }
}

impl Browser<KernelDriver> {
    /// Simulated browser over an in-process application.
    pub fn kernel(kernel: impl Kernel + 'static) -> Self {
        Self::kernel_with_config(kernel, Config::default())
    }

    pub fn kernel_with_config(kernel: impl Kernel + 'static, config: Config) -> Self {
        let driver = KernelDriver::new(kernel, &config.session);
        Self::new(driver, config)
    }

    /// Options merged under every later request.
    pub fn with_default_options(self, options: HttpOptions) -> Self {
        self.driver.borrow_mut().set_default_options(options);
        self
    }
}

#[cfg(feature = "chrome")]
impl Browser<super::chrome::ChromeDriver> {
    /// Launches Chrome right away so a missing binary fails here.
    pub fn chrome(config: Config) -> Result<Self> {
        let browser = Self::new(super::chrome::ChromeDriver::new(config.clone()), config);
        browser.start()?;
        Ok(browser)
    }
}

impl<D: Driver> Drop for Browser<D> {
    fn drop(&mut self) {
        if let Ok(mut driver) = self.driver.try_borrow_mut() {
            let _ = driver.stop();
        }
    }
}

impl<D: Driver> std::fmt::Debug for Browser<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Browser")
            .field("id", &self.id)
            .field("backend", &self.driver.try_borrow().map(|d| d.backend()).unwrap_or("busy"))
            .finish_non_exhaustive()
    }
}
