use crate::http::message::{Method, Request, Response};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// The application under test, called in-process for every request.
pub trait Kernel {
    fn handle(&mut self, request: &Request) -> Response;
}

impl<F> Kernel for F
where
    F: FnMut(&Request) -> Response,
{
    fn handle(&mut self, request: &Request) -> Response {
        self(request)
    }
}

/// Serves static files from a directory; `/` and directories map to
/// `index.html`. Only `GET` and `HEAD` are answered.
#[derive(Debug, Clone)]
pub struct DirectoryKernel {
    root: PathBuf,
}

impl DirectoryKernel {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, url_path: &str) -> Option<PathBuf> {
        let relative = Path::new(url_path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return None;
        }

        let mut path = self.root.join(relative);
        if path.is_dir() {
            path = path.join("index.html");
        }
        path.is_file().then_some(path)
    }
}

impl Kernel for DirectoryKernel {
    fn handle(&mut self, request: &Request) -> Response {
        if !matches!(request.method, Method::Get | Method::Head) {
            return Response::new(405).with_header("Allow", "GET, HEAD");
        }

        let path = match self.resolve(request.url.path()) {
            Some(path) => path,
            None => {
                debug!(path = %request.url.path(), "no file to serve");
                return Response::not_found();
            }
        };

        match std::fs::read_to_string(&path) {
            Ok(body) => Response::new(200)
                .with_header("Content-Type", content_type(&path))
                .with_body(body),
            Err(e) => Response::new(500).with_body(e.to_string()),
        }
    }
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("json") => "application/json",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
