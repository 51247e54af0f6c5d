use super::session::Browser;
use crate::core::driver::Driver;
use crate::dom::Document;
use crate::errors::{BrowserError, Result};
use std::any::{type_name, Any, TypeId};
use std::rc::Rc;
use tracing::debug;
use url::Url;

/// A page object built from the browser on demand.
pub trait Component<D: Driver>: Sized + 'static {
    fn create(browser: &Browser<D>) -> Result<Self>;

    /// Runs before the component is handed out, ahead of `pre_assertions`.
    fn pre_actions(&mut self, _browser: &Browser<D>) -> Result<()> {
        Ok(())
    }

    fn pre_assertions(&mut self, _browser: &Browser<D>) -> Result<()> {
        Ok(())
    }
}

type Factory<D> = Rc<dyn Fn(&Browser<D>) -> Result<Box<dyn Any>>>;

struct Entry<D: Driver> {
    type_id: TypeId,
    type_name: &'static str,
    factory: Factory<D>,
}

/// Ordered type → factory pairs consulted for callback parameters. The first
/// entry for a type wins.
pub struct ParameterRegistry<D: Driver> {
    entries: Vec<Entry<D>>,
}

impl<D: Driver> ParameterRegistry<D> {
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// Crawler, cookie jar, raw client, current document and current URL.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(|browser: &Browser<D>| browser.crawler());
        registry.register(|browser: &Browser<D>| browser.driver_mut().cookies());
        registry.register(|browser: &Browser<D>| Ok(browser.driver().client()));
        registry.register(|browser: &Browser<D>| -> Result<Rc<Document>> {
            browser.driver_mut().document()
        });
        registry.register(|browser: &Browser<D>| -> Result<Url> { browser.driver_mut().current_url() });
        registry
    }

    pub fn register<T: 'static>(&mut self, factory: impl Fn(&Browser<D>) -> Result<T> + 'static) {
        self.entries.push(Entry {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            factory: Rc::new(move |browser| Ok(Box::new(factory(browser)?) as Box<dyn Any>)),
        });
    }

    pub fn register_component<C: Component<D>>(&mut self) {
        self.register(|browser: &Browser<D>| {
            let mut component = C::create(browser)?;
            component.pre_actions(browser)?;
            component.pre_assertions(browser)?;
            Ok(component)
        });
    }

    pub fn supports<T: 'static>(&self) -> bool {
        self.entries.iter().any(|e| e.type_id == TypeId::of::<T>())
    }

    pub fn registered(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.type_name).collect()
    }

    pub fn resolve<T: 'static>(&self, browser: &Browser<D>) -> Result<T> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.type_id == TypeId::of::<T>())
            .ok_or_else(|| BrowserError::UnsupportedParameter(type_name::<T>().to_string()))?;
        debug!(parameter = entry.type_name, "injecting");
        let value = (entry.factory)(browser)?;
        value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| BrowserError::UnsupportedParameter(type_name::<T>().to_string()))
    }
}

impl<D: Driver> Default for ParameterRegistry<D> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Parameter lists `use_with` can build.
pub trait Injectable<D: Driver>: Sized {
    fn inject(browser: &Browser<D>) -> Result<Self>;
}

impl<D: Driver> Injectable<D> for () {
    fn inject(_browser: &Browser<D>) -> Result<Self> {
        Ok(())
    }
}

macro_rules! impl_injectable {
    ($($name:ident),+) => {
        impl<D: Driver, $($name: 'static),+> Injectable<D> for ($($name,)+) {
            fn inject(browser: &Browser<D>) -> Result<Self> {
                Ok(($(browser.registry().resolve::<$name>(browser)?,)+))
            }
        }
    };
}

impl_injectable!(A);
impl_injectable!(A, B);
impl_injectable!(A, B, C);
impl_injectable!(A, B, C, E);
impl_injectable!(A, B, C, E, F);
impl_injectable!(A, B, C, E, F, G);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::KernelDriver;
    use crate::dom::Crawler;
    use crate::http::CookieJar;
    use crate::http::{Kernel, Request, Response};
    use std::cell::RefCell;

    fn browser() -> Browser<KernelDriver> {
        let browser = Browser::kernel(|request: &Request| {
            Response::html(format!("<h1>{}</h1>", request.path()))
                .with_header("Set-Cookie", "seen=1")
        });
        browser.visit("/home").unwrap();
        browser
    }

    struct Heading {
        text: String,
        prepared: Vec<&'static str>,
    }

    impl Component<KernelDriver> for Heading {
        fn create(browser: &Browser<KernelDriver>) -> Result<Self> {
            Ok(Self {
                text: browser.crawler()?.filter("h1").text(),
                prepared: vec![],
            })
        }

        fn pre_actions(&mut self, _browser: &Browser<KernelDriver>) -> Result<()> {
            self.prepared.push("actions");
            Ok(())
        }

        fn pre_assertions(&mut self, _browser: &Browser<KernelDriver>) -> Result<()> {
            self.prepared.push("assertions");
            Ok(())
        }
    }

    #[test]
    fn test_default_parameters() {
        let browser = browser();
        let (heading, jar, url) = browser
            .use_with(|_, (crawler, jar, url): (Crawler, CookieJar, Url)| {
                (crawler.filter("h1").text(), jar, url)
            })
            .unwrap();
        assert_eq!(heading, "/home");
        assert_eq!(jar.value("seen"), Some("1"));
        assert_eq!(url.path(), "/home");
    }

    #[test]
    fn test_client_and_document() {
        let browser = browser();
        let title = browser
            .use_with(|_, (client, document): (Rc<RefCell<dyn Kernel>>, Rc<Document>)| {
                let response = client
                    .borrow_mut()
                    .handle(&Request::new(crate::http::Method::Get, Url::parse("http://x/raw").unwrap()));
                (response.body, document.generation())
            })
            .unwrap();
        assert_eq!(title.0, "<h1>/raw</h1>");
        assert!(title.1.is_some());
    }

    #[test]
    fn test_components_run_their_hooks_in_order() {
        let mut browser = browser();
        browser.register_component::<Heading>();
        let heading = browser.use_with(|_, (heading,): (Heading,)| heading).unwrap();
        assert_eq!(heading.text, "/home");
        assert_eq!(heading.prepared, vec!["actions", "assertions"]);
    }

    #[test]
    fn test_unknown_parameter_type() {
        let browser = browser();
        let result = browser.use_with(|_, (_name,): (String,)| ());
        match result {
            Err(BrowserError::UnsupportedParameter(name)) => assert!(name.contains("String")),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_custom_parameters_and_unit() {
        let mut browser = browser();
        browser.register_parameter(|_: &Browser<KernelDriver>| Ok(42u32));
        assert_eq!(browser.use_with(|_, (n,): (u32,)| n).unwrap(), 42);
        assert!(browser.use_with(|_, ()| 1).is_ok());
        assert!(browser.registry().supports::<u32>());
    }
}
