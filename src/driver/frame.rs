//! Embedded-frame adapter
//!
//! The control UI hosts the application under test in an iframe. Until the
//! adapter is told to drive that frame it forwards everything untouched;
//! afterwards relative `visit` targets are resolved against the app host so
//! the frame loads the real application and the UI can show a short URL.

use url::Url;

use crate::common::{Error, Result};

use super::{Action, PageDriver};

pub struct FrameDriver<D> {
    inner: D,
    app_host: Url,
    driving_frame: bool,
    /// Last URL loaded into the frame; unknown after history navigation
    frame_url: Option<String>,
}

impl<D: PageDriver> FrameDriver<D> {
    pub fn new(inner: D, app_host: &str) -> Result<Self> {
        let app_host = Url::parse(app_host).map_err(|e| Error::InvalidUrl {
            url: app_host.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            inner,
            app_host,
            driving_frame: false,
            frame_url: None,
        })
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn is_driving_frame(&self) -> bool {
        self.driving_frame
    }

    /// Load the control UI and switch to its embedded frame
    pub fn open_ui(&mut self, ui_origin: &str) -> Result<()> {
        tracing::info!("Driving iframe...");
        self.driving_frame = false;
        self.frame_url = None;
        self.inner.navigate(ui_origin)?;
        self.inner.drive_embedded_frame()?;
        self.driving_frame = true;
        Ok(())
    }

    /// Navigate to `target`
    ///
    /// Returns the display form of the URL when driving the frame.
    pub fn visit(&mut self, target: &str) -> Result<Option<String>> {
        if !self.driving_frame {
            self.inner.navigate(target)?;
            return Ok(None);
        }
        let (absolute, display) = resolve_url(&self.app_host, target)?;
        tracing::debug!(url = %absolute, "visit");
        self.inner.navigate(&absolute)?;
        self.frame_url = Some(absolute);
        Ok(Some(display))
    }

    /// URL of the page the test sees: the frame's while driving it
    pub fn current_url(&mut self) -> Result<Option<String>> {
        match (&self.frame_url, self.driving_frame) {
            (Some(url), true) => Ok(Some(url.clone())),
            _ => self.inner.current_url(),
        }
    }

    /// Reload the current page
    pub fn refresh(&mut self) -> Result<Option<String>> {
        match self.current_url()? {
            Some(url) => self.visit(&url),
            None => Ok(None),
        }
    }

    /// Navigate back in history
    ///
    /// History navigation leaves the frame, so it is driven again afterwards.
    pub fn go_back(&mut self, action: &Action) -> Result<()> {
        self.inner.perform(action)?;
        if self.driving_frame {
            self.frame_url = None;
            self.inner.drive_embedded_frame()?;
        }
        Ok(())
    }

    pub fn perform(&mut self, action: &Action) -> Result<()> {
        self.inner.perform(action)
    }
}

/// Resolve a visit target against the app host
///
/// Relative targets keep the base path as a prefix (apps mounted under a
/// sub-path) and their own query and fragment. Absolute URLs are used as
/// given. Returns `(absolute, display)`; the display form drops the app
/// host's origin and base path from URLs that live under it.
pub fn resolve_url(base: &Url, target: &str) -> Result<(String, String)> {
    let absolute = match Url::parse(target) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) if target.starts_with("//") => {
            base.join(target).map_err(|e| invalid(target, e))?
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => join_relative(base, target),
        Err(e) => return Err(invalid(target, e)),
    };

    let display = display_url(base, &absolute);
    Ok((absolute.to_string(), display))
}

fn display_url(base: &Url, absolute: &Url) -> String {
    if absolute.origin() != base.origin() {
        return absolute.to_string();
    }
    let base_path = base.path().trim_end_matches('/');
    let rest = match absolute.path().strip_prefix(base_path) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return absolute.to_string(),
    };

    let mut display = rest.to_string();
    if let Some(query) = absolute.query() {
        display.push('?');
        display.push_str(query);
    }
    if let Some(fragment) = absolute.fragment() {
        display.push('#');
        display.push_str(fragment);
    }
    if display.is_empty() {
        display.push('/');
    }
    display
}

fn join_relative(base: &Url, target: &str) -> Url {
    let (rest, fragment) = match target.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (target, None),
    };
    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };

    let base_path = base.path().trim_end_matches('/');
    let joined = if path.is_empty() {
        base.path().to_string()
    } else if path.starts_with('/') {
        format!("{base_path}{path}")
    } else {
        format!("{base_path}/{path}")
    };

    let mut url = base.clone();
    url.set_path(&joined);
    url.set_query(query);
    url.set_fragment(fragment);
    url
}

fn invalid(target: &str, e: url::ParseError) -> Error {
    Error::InvalidUrl {
        url: target.to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::RecordingDriver;

    fn base(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_relative_paths_keep_base_prefix() {
        let (abs, display) = resolve_url(&base("http://localhost:3000"), "/users?page=2#top").unwrap();
        assert_eq!(abs, "http://localhost:3000/users?page=2#top");
        assert_eq!(display, "/users?page=2#top");

        let (abs, display) = resolve_url(&base("http://localhost:3000/admin/"), "/users").unwrap();
        assert_eq!(abs, "http://localhost:3000/admin/users");
        assert_eq!(display, "/users");

        let (abs, _) = resolve_url(&base("http://localhost:3000/admin"), "users").unwrap();
        assert_eq!(abs, "http://localhost:3000/admin/users");
    }

    #[test]
    fn test_root_and_fragment_only_targets() {
        let (abs, display) = resolve_url(&base("http://localhost:3000"), "/").unwrap();
        assert_eq!(abs, "http://localhost:3000/");
        assert_eq!(display, "/");

        let (abs, _) = resolve_url(&base("http://localhost:3000/app"), "#settings").unwrap();
        assert_eq!(abs, "http://localhost:3000/app#settings");
    }

    #[test]
    fn test_absolute_urls_pass_through() {
        let (abs, display) =
            resolve_url(&base("http://localhost:3000"), "https://example.com/a").unwrap();
        assert_eq!(abs, "https://example.com/a");
        assert_eq!(display, "https://example.com/a");

        let (abs, display) =
            resolve_url(&base("http://localhost:3000"), "http://localhost:3000/b").unwrap();
        assert_eq!(abs, "http://localhost:3000/b");
        assert_eq!(display, "/b");
    }

    #[test]
    fn test_other_origins_are_shown_in_full() {
        let (_, display) =
            resolve_url(&base("http://localhost:3000"), "http://localhost:30001/x").unwrap();
        assert_eq!(display, "http://localhost:30001/x");

        let (_, display) =
            resolve_url(&base("http://localhost:3000/admin"), "http://localhost:3000/administer").unwrap();
        assert_eq!(display, "http://localhost:3000/administer");

        let (_, display) = resolve_url(&base("http://localhost:3000/app"), "#settings").unwrap();
        assert_eq!(display, "#settings");
    }

    #[test]
    fn test_malformed_target_is_rejected() {
        let err = resolve_url(&base("http://localhost:3000"), "http://[bad").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { ref url, .. } if url == "http://[bad"));
    }

    #[test]
    fn test_go_back_drives_the_frame_again() {
        let mut frame = FrameDriver::new(RecordingDriver::new(), "http://localhost:3000").unwrap();
        frame.go_back(&Action::new("go_back", 1)).unwrap();
        assert_eq!(frame.inner().frame_switches(), 0);

        frame.open_ui("http://localhost:3004").unwrap();
        frame.visit("/a").unwrap();
        assert_eq!(frame.current_url().unwrap().as_deref(), Some("http://localhost:3000/a"));

        frame.go_back(&Action::new("go_back", 2)).unwrap();
        assert_eq!(frame.inner().frame_switches(), 2);
        assert_eq!(frame.inner().methods(), vec!["go_back", "go_back"]);
    }

    #[test]
    fn test_forwards_until_frame_is_driven() {
        let mut frame = FrameDriver::new(RecordingDriver::new(), "http://localhost:3000").unwrap();
        assert_eq!(frame.visit("/login").unwrap(), None);
        assert!(!frame.is_driving_frame());

        frame.open_ui("http://localhost:3004").unwrap();
        assert!(frame.is_driving_frame());
        assert_eq!(frame.visit("/login").unwrap().as_deref(), Some("/login"));
        assert_eq!(frame.refresh().unwrap().as_deref(), Some("/login"));

        assert_eq!(
            frame.inner().navigations(),
            vec![
                "/login",
                "http://localhost:3004",
                "http://localhost:3000/login",
                "http://localhost:3000/login",
            ]
        );
    }

    #[test]
    fn test_invalid_app_host() {
        let err = FrameDriver::new(RecordingDriver::new(), "not a url").err().unwrap();
        assert!(matches!(err, Error::InvalidUrl { .. }));
    }
}
