//! Registry of method names that count as steps

use std::collections::BTreeSet;

use crate::common::config::StepsConfig;

/// Capybara session actions that change or wait on the page
const SESSION_ACTIONS: &[&str] = &[
    "visit",
    "refresh",
    "go_back",
    "go_forward",
    "click_on",
    "click_link_or_button",
    "click_button",
    "click_link",
    "fill_in",
    "choose",
    "check",
    "uncheck",
    "select",
    "unselect",
    "attach_file",
    "within",
    "within_element",
    "within_fieldset",
    "within_table",
    "within_frame",
    "within_window",
    "switch_to_frame",
    "switch_to_window",
    "accept_alert",
    "accept_confirm",
    "dismiss_confirm",
    "accept_prompt",
    "dismiss_prompt",
    "execute_script",
    "click",
    "double_click",
    "right_click",
    "hover",
    "drag_to",
    "drop",
    "send_keys",
    "set",
    "select_option",
    "unselect_option",
    "scroll_to",
    "reset_session!",
];

/// Capybara RSpec matchers
const RSPEC_MATCHERS: &[&str] = &[
    "have_text",
    "have_content",
    "have_no_text",
    "have_no_content",
    "have_css",
    "have_no_css",
    "have_selector",
    "have_no_selector",
    "have_xpath",
    "have_no_xpath",
    "have_link",
    "have_no_link",
    "have_button",
    "have_no_button",
    "have_field",
    "have_no_field",
    "have_checked_field",
    "have_unchecked_field",
    "have_select",
    "have_no_select",
    "have_table",
    "have_no_table",
    "have_title",
    "have_no_title",
    "have_current_path",
    "have_no_current_path",
    "have_element",
    "have_sibling",
    "have_ancestor",
    "match_selector",
    "match_css",
    "match_xpath",
    "become_closed",
];

/// Capybara Minitest assertions
const MINITEST_ASSERTIONS: &[&str] = &[
    "assert_text",
    "assert_no_text",
    "assert_content",
    "assert_no_content",
    "assert_selector",
    "assert_no_selector",
    "assert_css",
    "assert_no_css",
    "assert_xpath",
    "assert_no_xpath",
    "assert_link",
    "assert_no_link",
    "assert_button",
    "assert_no_button",
    "assert_field",
    "assert_no_field",
    "assert_checked_field",
    "assert_unchecked_field",
    "assert_select",
    "assert_no_select",
    "assert_table",
    "assert_no_table",
    "assert_title",
    "assert_no_title",
    "assert_current_path",
    "assert_no_current_path",
    "assert_matches_selector",
    "assert_not_matches_selector",
    "assert_element",
    "assert_no_element",
    "refute_text",
    "refute_selector",
    "refute_css",
    "refute_xpath",
    "refute_link",
    "refute_button",
    "refute_field",
    "refute_title",
    "refute_current_path",
];

/// Page queries that never count as steps, even when configured
const READ_ONLY_QUERIES: &[&str] = &[
    "current_url",
    "current_path",
    "current_host",
    "text",
    "html",
    "title",
    "page",
    "find",
    "all",
    "first",
    "evaluate_script",
    "has_text?",
    "has_css?",
    "has_selector?",
];

/// Set of method names whose calls are recorded as steps
///
/// Built once at startup from the defaults plus configured extensions and
/// exclusions, then passed to the extractor and the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSet {
    names: BTreeSet<String>,
}

impl Default for TriggerSet {
    fn default() -> Self {
        let names = SESSION_ACTIONS
            .iter()
            .chain(RSPEC_MATCHERS)
            .chain(MINITEST_ASSERTIONS)
            .map(|name| name.to_string())
            .collect();
        Self { names }
    }
}

impl TriggerSet {
    /// A set containing exactly `names`
    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self {
            names: BTreeSet::new(),
        };
        set.extend(names);
        set
    }

    /// Defaults plus `[steps] extra`, minus `[steps] exclude`
    pub fn from_config(config: &StepsConfig) -> Self {
        let mut set = Self::default();
        set.extend(config.extra.iter().cloned());
        set.exclude(config.exclude.iter().map(String::as_str));
        set
    }

    /// Add names; read-only page queries are ignored
    pub fn extend<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if READ_ONLY_QUERIES.contains(&name.as_str()) {
                tracing::warn!(method = %name, "Ignoring read-only page query as a step trigger");
                continue;
            }
            self.names.insert(name);
        }
    }

    pub fn exclude<'a, I>(&mut self, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for name in names {
            self.names.remove(name);
        }
    }

    pub fn contains(&self, method: &str) -> bool {
        self.names.contains(method)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
