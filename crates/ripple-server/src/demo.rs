//! The demo page served at `/`.
//!
//! All state lives in one [`Demo`] shared by every session, so two tabs
//! show each other's edits as they happen.

use chrono::NaiveDate;
use ripple_core::widget::{Binding, NamedBoolArray, Shared, Widget};
use ripple_core::{handler, html, HandlerError, Session, SessionError, Tag};
use ripple_protocol::PROTOCOL_VERSION;
use std::fmt::Write as _;
use std::sync::Arc;

/// Read-only text rendered from shared state and HTML-escaped.
struct Shown<T> {
    value: Shared<T>,
    show: fn(T) -> String,
}

impl<T: Clone + Send + Sync> Binding<String> for Shown<T> {
    fn get(&self) -> String {
        html::escape(&(self.show)(self.value.get()))
    }

    fn set(&self, _value: String) -> Result<(), HandlerError> {
        Err(HandlerError::failed("value is read-only"))
    }

    fn tag(&self) -> Option<Tag> {
        Some(self.value.tag())
    }
}

fn greeting(name: String) -> String {
    if name.is_empty() {
        "Hello!".to_string()
    } else {
        format!("Hello, {name}!")
    }
}

fn level_text(level: f64) -> String {
    format!("Level is {level}")
}

fn enabled_text(enabled: bool) -> String {
    if enabled { "Enabled" } else { "Disabled" }.to_string()
}

fn click_count(n: u64) -> String {
    match n {
        1 => "clicked once".to_string(),
        n => format!("clicked {n} times"),
    }
}

/// Shared demo state.
#[derive(Clone)]
pub struct Demo {
    name: Shared<String>,
    notes: Shared<String>,
    level: Shared<f64>,
    enabled: Shared<bool>,
    day: Shared<NaiveDate>,
    color: Arc<NamedBoolArray>,
    clicks: Shared<u64>,
}

impl Default for Demo {
    fn default() -> Self {
        Self::new()
    }
}

impl Demo {
    /// Fresh demo state.
    #[must_use]
    pub fn new() -> Self {
        let color = NamedBoolArray::new()
            .with("red", "Red")
            .with("green", "Green")
            .with("blue", "Blue");
        color.select("green");
        Self {
            name: Shared::new(String::new()),
            notes: Shared::new(String::new()),
            level: Shared::new(50.0),
            enabled: Shared::new(true),
            day: Shared::new(NaiveDate::default()),
            color: Arc::new(color),
            clicks: Shared::new(0),
        }
    }

    /// Current name.
    #[must_use]
    pub fn name(&self) -> String {
        self.name.get()
    }

    /// Replace the name.
    pub fn set_name(&self, name: impl Into<String>) {
        self.name.set(name.into());
    }

    /// Tag of the name field.
    #[must_use]
    pub fn name_tag(&self) -> Tag {
        self.name.tag()
    }

    /// Number of button clicks.
    #[must_use]
    pub fn clicks(&self) -> u64 {
        self.clicks.get()
    }

    /// Render the page for `session`.
    ///
    /// # Errors
    ///
    /// Returns an error if a widget cannot be registered.
    pub fn render(&self, session: &Session, ws_path: &str) -> Result<String, SessionError> {
        let clicks = self.clicks.clone();
        let on_click = handler(move |ev| {
            clicks.update(|n| *n += 1);
            ev.session.dirty_all(vec![clicks.tag()]);
            Ok(())
        });

        let demo = self.clone();
        let on_reset = handler(move |ev| {
            demo.reset();
            ev.session.dirty_all(demo.tags());
            Ok(())
        });

        let mut page = String::with_capacity(4096);
        page.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>ripple</title></head>\n<body>\n");
        page.push_str("<div id=\"alerts\"></div>\n");
        page.push_str("<h1>");
        page.push_str(&session.render(
            Widget::span(Shown {
                value: self.name.clone(),
                show: greeting,
            }),
            &[],
        )?);
        page.push_str("</h1>\n");

        field(&mut page, "Name", session.render(Widget::text(self.name.clone()), &[])?);
        field(
            &mut page,
            "Notes",
            session.render_with(Widget::textarea(self.notes.clone()), &[], &["rows=\"3\""])?,
        );
        field(
            &mut page,
            "Level",
            session.render_with(
                Widget::range(self.level.clone()),
                &[],
                &["min=\"0\"", "max=\"100\""],
            )? + &session.render(Widget::number(self.level.clone()), &[])?,
        );
        field(&mut page, "Enabled", session.render(Widget::checkbox(self.enabled.clone()), &[])?);
        field(&mut page, "Day", session.render(Widget::date(self.day.clone()), &[])?);
        field(&mut page, "Color", session.render(Widget::select(self.color.clone()), &[])?);
        page.push_str("<p>");
        for radio in Widget::radio_group(&self.color) {
            let _ = write!(
                page,
                "<label>{} {}</label> ",
                session.render(radio.widget, &[])?,
                radio.label
            );
        }
        page.push_str("</p>
<ul>");
        page.push_str(&session.render(
            Widget::li(Shown {
                value: self.level.clone(),
                show: level_text,
            }),
            &[],
        )?);
        page.push_str(&session.render(
            Widget::li(Shown {
                value: self.enabled.clone(),
                show: enabled_text,
            }),
            &[],
        )?);
        page.push_str("</ul>\n");

        page.push_str("<p>");
        page.push_str(&session.render(Widget::button("Click me", Some(on_click)), &[])?);
        page.push(' ');
        page.push_str(&session.render(
            Widget::span(Shown {
                value: self.clicks.clone(),
                show: click_count,
            }),
            &[],
        )?);
        page.push_str("</p>\n<p>");
        page.push_str(&session.render(Widget::button("Reset", Some(on_reset)), &[])?);
        page.push_str("</p>\n");

        let _ = write!(
            page,
            "<script src=\"/ripple.js\" data-key=\"{}\" data-path=\"{}\" data-version=\"{}\"></script>\n",
            session.key(),
            html::escape(ws_path),
            PROTOCOL_VERSION,
        );
        page.push_str("</body></html>\n");
        Ok(page)
    }

    fn reset(&self) {
        self.name.set(String::new());
        self.notes.set(String::new());
        self.level.set(50.0);
        self.enabled.set(true);
        self.day.set(NaiveDate::default());
        self.color.select("green");
        self.clicks.set(0);
    }

    fn tags(&self) -> Vec<Tag> {
        vec![
            self.name.tag(),
            self.notes.tag(),
            self.level.tag(),
            self.enabled.tag(),
            self.day.tag(),
            Tag::of(&self.color),
            self.clicks.tag(),
        ]
    }
}

fn field(page: &mut String, label: &str, html: String) {
    let _ = writeln!(page, "<p><label>{label} {html}</label></p>");
}
