//! Renderable widgets.
//!
//! Widgets are a closed set of variants behind the [`Ui`] capability. Each
//! one renders its initial HTML, produces update frames when its element
//! is marked dirty, and applies browser events to its binding.

use chrono::NaiveDate;
use parking_lot::RwLock;
use ripple_protocol::{Command, Frame, Jid};
use std::fmt;
use std::sync::Arc;

use crate::error::HandlerError;
use crate::event::{Event, EventFn};
use crate::html;
use crate::tag::Tag;

/// Date format used on the wire and by `<input type="date">`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// The capability every widget provides.
pub trait Ui: Send + Sync {
    /// Tags the element should be registered under.
    fn tags(&self) -> Vec<Tag>;

    /// Append the initial HTML for element `jid`.
    fn render(&self, jid: Jid, attrs: &[&str], out: &mut String);

    /// Frames that bring the browser's copy of element `jid` up to date.
    fn update(&self, jid: Jid) -> Vec<Frame>;

    /// Apply a browser event.
    ///
    /// # Errors
    ///
    /// A payload that does not parse is reported as
    /// [`HandlerError::Value`] and leaves the binding untouched.
    fn handle_event(&self, event: &Event<'_>) -> Result<(), HandlerError>;

    /// Whether the widget reacts to events at all.
    fn handles_events(&self) -> bool;
}

/// A value a widget reads from and writes to.
pub trait Binding<T>: Send + Sync {
    /// Current value.
    fn get(&self) -> T;

    /// Store a new value.
    ///
    /// # Errors
    ///
    /// Implementations may refuse a value.
    fn set(&self, value: T) -> Result<(), HandlerError>;

    /// Tag to mark dirty when the value changes.
    fn tag(&self) -> Option<Tag>;
}

/// Shared, lock-protected application state.
///
/// Clones share the value, and the value's tag is its allocation identity,
/// so every widget bound to the same `Shared` re-renders together.
pub struct Shared<T>(Arc<RwLock<T>>);

impl<T> Shared<T> {
    /// Wrap a value.
    pub fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Replace the value.
    pub fn set(&self, value: T) {
        *self.0.write() = value;
    }

    /// Modify the value in place.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.write())
    }

    /// The tag elements bound to this value are registered under.
    #[must_use]
    pub fn tag(&self) -> Tag {
        Tag::of(&self.0)
    }
}

impl<T: Clone> Shared<T> {
    /// A copy of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.0.read().clone()
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Shared").field(&*self.0.read()).finish()
    }
}

impl<T: Clone + Send + Sync> Binding<T> for Shared<T> {
    fn get(&self) -> T {
        Shared::get(self)
    }

    fn set(&self, value: T) -> Result<(), HandlerError> {
        Shared::set(self, value);
        Ok(())
    }

    fn tag(&self) -> Option<Tag> {
        Some(Shared::tag(self))
    }
}

/// A value that never changes, such as a button label.
#[derive(Debug, Clone)]
pub struct Fixed<T>(pub T);

impl<T: Clone + Send + Sync> Binding<T> for Fixed<T> {
    fn get(&self) -> T {
        self.0.clone()
    }

    fn set(&self, _value: T) -> Result<(), HandlerError> {
        Err(HandlerError::failed("value is read-only"))
    }

    fn tag(&self) -> Option<Tag> {
        None
    }
}

/// A named checkable entry with an HTML label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBool {
    /// Value sent by the browser.
    pub name: String,
    /// Label, as HTML.
    pub html: String,
    /// Whether it is checked.
    pub checked: bool,
}

/// An ordered set of [`NamedBool`]s, the state behind a `<select>` or a
/// radio group.
#[derive(Debug, Default)]
pub struct NamedBoolArray {
    items: RwLock<Vec<NamedBool>>,
}

impl NamedBoolArray {
    /// An empty array.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an unchecked entry.
    #[must_use]
    pub fn with(self, name: impl Into<String>, html: impl Into<String>) -> Self {
        self.push(name, html);
        self
    }

    /// Append an unchecked entry.
    pub fn push(&self, name: impl Into<String>, html: impl Into<String>) {
        self.items.write().push(NamedBool {
            name: name.into(),
            html: html.into(),
            checked: false,
        });
    }

    /// Name of the first checked entry.
    #[must_use]
    pub fn selected(&self) -> Option<String> {
        self.items
            .read()
            .iter()
            .find(|nb| nb.checked)
            .map(|nb| nb.name.clone())
    }

    /// Check exactly the entry called `name`. An empty name unchecks all.
    ///
    /// Returns `false` if no entry has that name, in which case nothing
    /// changes.
    pub fn select(&self, name: &str) -> bool {
        let mut items = self.items.write();
        if !name.is_empty() && !items.iter().any(|nb| nb.name == name) {
            return false;
        }
        for nb in items.iter_mut() {
            nb.checked = nb.name == name;
        }
        true
    }

    /// Whether the entry called `name` is checked.
    #[must_use]
    pub fn is_checked(&self, name: &str) -> bool {
        self.items
            .read()
            .iter()
            .any(|nb| nb.checked && nb.name == name)
    }

    /// Copy of all entries.
    #[must_use]
    pub fn snapshot(&self) -> Vec<NamedBool> {
        self.items.read().clone()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

type Text = Arc<dyn Binding<String>>;

/// The widget set.
pub enum Widget {
    /// `<input type="text">`.
    Text(Text),
    /// `<input type="password">`.
    Password(Text),
    /// `<textarea>`.
    Textarea(Text),
    /// `<input type="number">`.
    Number(Arc<dyn Binding<f64>>),
    /// `<input type="range">`.
    Range(Arc<dyn Binding<f64>>),
    /// `<input type="checkbox">`.
    Checkbox(Arc<dyn Binding<bool>>),
    /// `<input type="radio">` in `group`.
    Radio {
        /// The radio group name.
        group: String,
        /// Whether this button is checked.
        value: Arc<dyn Binding<bool>>,
    },
    /// `<input type="date">`.
    Date(Arc<dyn Binding<NaiveDate>>),
    /// `<select>` over a [`NamedBoolArray`].
    Select(Arc<NamedBoolArray>),
    /// `<input type="radio">` for the entry `name` of a [`NamedBoolArray`].
    /// See [`Widget::radio_group`].
    RadioOption {
        /// The radio group name.
        group: String,
        /// The entries.
        options: Arc<NamedBoolArray>,
        /// The entry this button checks.
        name: String,
    },
    /// `<button>` with HTML content.
    Button {
        /// Button content, as HTML.
        html: Text,
        /// Click handler.
        on_click: Option<EventFn>,
    },
    /// `<span>` with HTML content.
    Span(Text),
    /// `<div>` with HTML content.
    Div(Text),
    /// `<li>` with HTML content.
    Li(Text),
    /// An addressable slot with a handler and no markup.
    Handler(Option<EventFn>),
}

impl Widget {
    /// Text input bound to `value`.
    pub fn text(value: impl Binding<String> + 'static) -> Self {
        Widget::Text(Arc::new(value))
    }

    /// Password input bound to `value`.
    pub fn password(value: impl Binding<String> + 'static) -> Self {
        Widget::Password(Arc::new(value))
    }

    /// Textarea bound to `value`.
    pub fn textarea(value: impl Binding<String> + 'static) -> Self {
        Widget::Textarea(Arc::new(value))
    }

    /// Number input bound to `value`.
    pub fn number(value: impl Binding<f64> + 'static) -> Self {
        Widget::Number(Arc::new(value))
    }

    /// Range slider bound to `value`.
    pub fn range(value: impl Binding<f64> + 'static) -> Self {
        Widget::Range(Arc::new(value))
    }

    /// Checkbox bound to `value`.
    pub fn checkbox(value: impl Binding<bool> + 'static) -> Self {
        Widget::Checkbox(Arc::new(value))
    }

    /// Radio button in `group` bound to `value`.
    pub fn radio(group: impl Into<String>, value: impl Binding<bool> + 'static) -> Self {
        Widget::Radio {
            group: group.into(),
            value: Arc::new(value),
        }
    }

    /// Date input bound to `value`.
    pub fn date(value: impl Binding<NaiveDate> + 'static) -> Self {
        Widget::Date(Arc::new(value))
    }

    /// Select over `options`.
    #[must_use]
    pub fn select(options: Arc<NamedBoolArray>) -> Self {
        Widget::Select(options)
    }

    /// One radio button per entry of `options`, all in the same group.
    ///
    /// Checking a button selects its entry, so the buttons stay in step
    /// with any `<select>` over the same array.
    #[must_use]
    pub fn radio_group(options: &Arc<NamedBoolArray>) -> Vec<RadioButton> {
        let group = format!("radio-{:x}", Arc::as_ptr(options) as usize);
        options
            .snapshot()
            .into_iter()
            .map(|nb| RadioButton {
                widget: Widget::RadioOption {
                    group: group.clone(),
                    options: options.clone(),
                    name: nb.name,
                },
                label: nb.html,
            })
            .collect()
    }

    /// Button with a fixed label.
    pub fn button(html: impl Into<String>, on_click: Option<EventFn>) -> Self {
        Widget::Button {
            html: Arc::new(Fixed(html.into())),
            on_click,
        }
    }

    /// Span showing `html`.
    pub fn span(html: impl Binding<String> + 'static) -> Self {
        Widget::Span(Arc::new(html))
    }

    /// Div showing `html`.
    pub fn div(html: impl Binding<String> + 'static) -> Self {
        Widget::Div(Arc::new(html))
    }

    /// List item showing `html`.
    pub fn li(html: impl Binding<String> + 'static) -> Self {
        Widget::Li(Arc::new(html))
    }

    /// Variant name, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Widget::Text(_) => "text",
            Widget::Password(_) => "password",
            Widget::Textarea(_) => "textarea",
            Widget::Number(_) => "number",
            Widget::Range(_) => "range",
            Widget::Checkbox(_) => "checkbox",
            Widget::Radio { .. } => "radio",
            Widget::Date(_) => "date",
            Widget::Select(_) => "select",
            Widget::RadioOption { .. } => "radio_option",
            Widget::Button { .. } => "button",
            Widget::Span(_) => "span",
            Widget::Div(_) => "div",
            Widget::Li(_) => "li",
            Widget::Handler(_) => "handler",
        }
    }
}

/// A radio button made by [`Widget::radio_group`].
#[derive(Debug)]
pub struct RadioButton {
    /// The `<input type="radio">`.
    pub widget: Widget,
    /// The entry's label, as HTML.
    pub label: String,
}

impl fmt::Debug for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Widget").field(&self.kind()).finish()
    }
}

impl Ui for Widget {
    fn tags(&self) -> Vec<Tag> {
        let tag = match self {
            Widget::Text(b) | Widget::Password(b) | Widget::Textarea(b) => b.tag(),
            Widget::Number(b) | Widget::Range(b) => b.tag(),
            Widget::Checkbox(b) | Widget::Radio { value: b, .. } => b.tag(),
            Widget::Date(b) => b.tag(),
            Widget::Select(options) | Widget::RadioOption { options, .. } => {
                Some(Tag::of(options))
            }
            Widget::Button { html, .. }
            | Widget::Span(html)
            | Widget::Div(html)
            | Widget::Li(html) => html.tag(),
            Widget::Handler(_) => None,
        };
        tag.into_iter().collect()
    }

    fn render(&self, jid: Jid, attrs: &[&str], out: &mut String) {
        match self {
            Widget::Text(b) => input(out, jid, attrs, "text", &b.get()),
            Widget::Password(b) => input(out, jid, attrs, "password", &b.get()),
            Widget::Textarea(b) => {
                html::open_tag(out, "textarea", jid, attrs);
                out.push('>');
                html::escape_into(&b.get(), out);
                out.push_str("</textarea>");
            }
            Widget::Number(b) => input(out, jid, attrs, "number", &b.get().to_string()),
            Widget::Range(b) => input(out, jid, attrs, "range", &b.get().to_string()),
            Widget::Checkbox(b) => checkable(out, jid, attrs, "checkbox", None, b.get()),
            Widget::Radio { group, value } => {
                checkable(out, jid, attrs, "radio", Some(group.as_str()), value.get());
            }
            Widget::Date(b) => {
                input(out, jid, attrs, "date", &b.get().format(DATE_FORMAT).to_string());
            }
            Widget::Select(options) => {
                html::open_tag(out, "select", jid, attrs);
                out.push('>');
                for nb in options.snapshot() {
                    out.push_str("<option");
                    html::attr(out, "value", &nb.name);
                    if nb.checked {
                        out.push_str(" selected");
                    }
                    out.push('>');
                    out.push_str(&nb.html);
                    out.push_str("</option>");
                }
                out.push_str("</select>");
            }
            Widget::RadioOption {
                group,
                options,
                name,
            } => {
                let checked = options.is_checked(name);
                checkable(out, jid, attrs, "radio", Some(group.as_str()), checked);
            }
            Widget::Button { html, .. } => {
                html::open_tag(out, "button", jid, attrs);
                html::attr(out, "type", "button");
                out.push('>');
                out.push_str(&html.get());
                out.push_str("</button>");
            }
            Widget::Span(html) => container(out, "span", jid, attrs, &html.get()),
            Widget::Div(html) => container(out, "div", jid, attrs, &html.get()),
            Widget::Li(html) => container(out, "li", jid, attrs, &html.get()),
            Widget::Handler(_) => {}
        }
    }

    fn update(&self, jid: Jid) -> Vec<Frame> {
        let frame = match self {
            Widget::Text(b) | Widget::Password(b) | Widget::Textarea(b) => {
                Frame::value(jid, b.get())
            }
            Widget::Number(b) | Widget::Range(b) => Frame::value(jid, b.get().to_string()),
            Widget::Checkbox(b) | Widget::Radio { value: b, .. } => checked_frame(jid, b.get()),
            Widget::RadioOption { options, name, .. } => {
                checked_frame(jid, options.is_checked(name))
            }
            Widget::Date(b) => Frame::value(jid, b.get().format(DATE_FORMAT).to_string()),
            Widget::Select(options) => Frame::value(jid, options.selected().unwrap_or_default()),
            Widget::Button { html, .. }
            | Widget::Span(html)
            | Widget::Div(html)
            | Widget::Li(html) => Frame::inner(jid, html.get()),
            Widget::Handler(_) => return Vec::new(),
        };
        vec![frame]
    }

    fn handle_event(&self, event: &Event<'_>) -> Result<(), HandlerError> {
        match self {
            Widget::Text(b) | Widget::Password(b) | Widget::Textarea(b) => {
                apply_input(event, b.as_ref(), |s| Ok(s.to_string()))
            }
            Widget::Number(b) | Widget::Range(b) => apply_input(event, b.as_ref(), parse_number),
            Widget::Checkbox(b) | Widget::Radio { value: b, .. } => {
                apply_input(event, b.as_ref(), parse_bool)
            }
            Widget::Date(b) => apply_input(event, b.as_ref(), parse_date),
            Widget::Select(options) => {
                if event.command != Command::Input {
                    return Ok(());
                }
                if !options.select(event.payload) {
                    return Err(HandlerError::value("option", event.payload));
                }
                event.session.dirty_others(vec![Tag::of(options)]);
                Ok(())
            }
            Widget::RadioOption { options, name, .. } => {
                if event.command != Command::Input {
                    return Ok(());
                }
                if parse_bool(event.payload)? {
                    options.select(name);
                } else if options.is_checked(name) {
                    options.select("");
                }
                event.session.dirty_others(vec![Tag::of(options)]);
                Ok(())
            }
            Widget::Button {
                on_click: Some(f), ..
            } if event.command == Command::Click => f(event),
            Widget::Handler(Some(f)) => f(event),
            _ => Ok(()),
        }
    }

    fn handles_events(&self) -> bool {
        !matches!(
            self,
            Widget::Button { on_click: None, .. }
                | Widget::Span(_)
                | Widget::Div(_)
                | Widget::Li(_)
                | Widget::Handler(None)
        )
    }
}

fn input(out: &mut String, jid: Jid, attrs: &[&str], kind: &str, value: &str) {
    html::open_tag(out, "input", jid, attrs);
    html::attr(out, "type", kind);
    html::attr(out, "value", value);
    out.push('>');
}

fn checkable(
    out: &mut String,
    jid: Jid,
    attrs: &[&str],
    kind: &str,
    group: Option<&str>,
    checked: bool,
) {
    html::open_tag(out, "input", jid, attrs);
    html::attr(out, "type", kind);
    if let Some(group) = group {
        html::attr(out, "name", group);
    }
    if checked {
        out.push_str(" checked");
    }
    out.push('>');
}

fn checked_frame(jid: Jid, checked: bool) -> Frame {
    if checked {
        Frame::set_attr(jid, "checked", "")
    } else {
        Frame::remove_attr(jid, "checked")
    }
}

fn container(out: &mut String, tag: &str, jid: Jid, attrs: &[&str], inner: &str) {
    html::open_tag(out, tag, jid, attrs);
    out.push('>');
    out.push_str(inner);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn apply_input<T>(
    event: &Event<'_>,
    binding: &dyn Binding<T>,
    parse: impl Fn(&str) -> Result<T, HandlerError>,
) -> Result<(), HandlerError> {
    if event.command != Command::Input {
        return Ok(());
    }
    let value = parse(event.payload)?;
    binding.set(value)?;
    if let Some(tag) = binding.tag() {
        event.session.dirty_others(vec![tag]);
    }
    Ok(())
}

/// Parse a number input. Empty means zero.
///
/// # Errors
///
/// Returns [`HandlerError::Value`] if `s` is not a number.
pub fn parse_number(s: &str) -> Result<f64, HandlerError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(0.0);
    }
    s.parse().map_err(|_| HandlerError::value("number", s))
}

/// Parse a checkbox value. Empty means unchecked.
///
/// # Errors
///
/// Returns [`HandlerError::Value`] for anything but the usual boolean
/// spellings.
pub fn parse_bool(s: &str) -> Result<bool, HandlerError> {
    match s {
        "" | "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        _ => Err(HandlerError::value("bool", s)),
    }
}

/// Parse a `YYYY-MM-DD` date. Empty means the epoch date.
///
/// # Errors
///
/// Returns [`HandlerError::Value`] if `s` is not a date.
pub fn parse_date(s: &str) -> Result<NaiveDate, HandlerError> {
    if s.is_empty() {
        return Ok(NaiveDate::default());
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| HandlerError::value("date", s))
}
