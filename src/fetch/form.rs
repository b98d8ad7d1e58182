// src/fetch/form.rs

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, trace, warn};
use url::Url;

/// `__doPostBack('target','argument')`, also in the escaped form ASP.NET
/// emits inside `setTimeout('...')` for auto-postback controls.
static POSTBACK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"__doPostBack\(\\?'([^'\\]*)\\?'\s*,\s*\\?'([^'\\]*)\\?'\)")
        .expect("postback pattern should compile")
});

/// Name/value pairs the form will post, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    pairs: Vec<(String, String)>,
}

impl FormFields {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str, value: &str) -> bool {
        self.pairs.iter().any(|(n, v)| n == name && v == value)
    }

    /// Replace every value of `name` with a single `value` (radio semantics).
    pub fn set(&mut self, name: &str, value: &str) {
        match self.pairs.iter().position(|(n, _)| n == name) {
            Some(first) => {
                self.pairs[first].1 = value.to_string();
                let mut idx = 0;
                self.pairs.retain(|(n, _)| {
                    let keep = idx <= first || n != name;
                    idx += 1;
                    keep
                });
            }
            None => self.pairs.push((name.to_string(), value.to_string())),
        }
    }

    /// Add a value without touching existing ones (checkbox semantics).
    pub fn add(&mut self, name: &str, value: &str) {
        self.pairs.push((name.to_string(), value.to_string()));
    }

    pub fn remove(&mut self, name: &str) {
        self.pairs.retain(|(n, _)| n != name);
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// The first `<form>` of a page: where it posts and what it would send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormState {
    pub action: Url,
    pub fields: FormFields,
}

/// Owned snapshot of a located element, so the parsed page can be dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Control {
    pub tag: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub value: Option<String>,
    pub input_type: Option<String>,
    pub checked: bool,
    pub href: Option<String>,
    pub onclick: Option<String>,
    /// Which strategy found it.
    pub matched_by: &'static str,
}

impl Control {
    fn from_element(el: ElementRef<'_>, matched_by: &'static str) -> Self {
        let v = el.value();
        let attr = |a: &str| v.attr(a).map(str::to_string);
        Self {
            tag: v.name().to_string(),
            id: attr("id"),
            name: attr("name"),
            value: attr("value"),
            input_type: attr("type").map(|t| t.to_ascii_lowercase()),
            checked: v.attr("checked").is_some(),
            href: attr("href"),
            onclick: attr("onclick"),
            matched_by,
        }
    }

    /// `(target, argument)` when clicking this control posts the form back.
    pub fn postback(&self) -> Option<(String, String)> {
        self.href
            .as_deref()
            .and_then(postback_target)
            .or_else(|| self.onclick.as_deref().and_then(postback_target))
    }

    /// Value a checked radio or checkbox contributes to the form.
    pub fn submitted_value(&self) -> String {
        self.value.clone().unwrap_or_else(|| "on".to_string())
    }

    pub fn label(&self) -> String {
        self.id
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| self.tag.clone())
    }
}

/// Extract `(target, argument)` from a `__doPostBack` call.
pub fn postback_target(script: &str) -> Option<(String, String)> {
    POSTBACK
        .captures(script)
        .map(|c| (c[1].to_string(), c[2].to_string()))
}

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(e) => {
            warn!(css, error = ?e, "invalid selector skipped");
            None
        }
    }
}

/// Try each CSS strategy in order and return the first element found.
pub fn locate(html: &str, strategies: &[&'static str]) -> Option<Control> {
    let doc = Html::parse_document(html);
    strategies.iter().find_map(|&css| {
        let sel = selector(css)?;
        let found = doc.select(&sel).next().map(|el| Control::from_element(el, css));
        match &found {
            Some(_) => debug!(css, "element located"),
            None => trace!(css, "strategy found nothing"),
        }
        found
    })
}

/// Collect the first form on the page and the values it would submit.
pub fn parse_form(html: &str, page_url: &Url) -> Option<FormState> {
    let doc = Html::parse_document(html);
    let form_sel = selector("form")?;
    let form = doc.select(&form_sel).next()?;

    let action = form
        .value()
        .attr("action")
        .filter(|a| !a.trim().is_empty())
        .and_then(|a| page_url.join(a).ok())
        .unwrap_or_else(|| page_url.clone());

    let field_sel = selector("input[name], select[name], textarea[name]")?;
    let option_sel = selector("option")?;
    let mut fields = FormFields::default();

    for el in form.select(&field_sel) {
        let v = el.value();
        let Some(name) = v.attr("name") else { continue };
        match v.name() {
            "input" => {
                let kind = v.attr("type").unwrap_or("text").to_ascii_lowercase();
                match kind.as_str() {
                    "submit" | "button" | "image" | "reset" | "file" => {}
                    "radio" | "checkbox" => {
                        if v.attr("checked").is_some() {
                            fields.add(name, v.attr("value").unwrap_or("on"));
                        }
                    }
                    _ => fields.add(name, v.attr("value").unwrap_or("")),
                }
            }
            "select" => {
                let options: Vec<ElementRef<'_>> = el.select(&option_sel).collect();
                let selected: Vec<&ElementRef<'_>> = options
                    .iter()
                    .filter(|o| o.value().attr("selected").is_some())
                    .collect();
                let option_value = |o: &ElementRef<'_>| {
                    o.value()
                        .attr("value")
                        .map(str::to_string)
                        .unwrap_or_else(|| o.text().collect::<String>().trim().to_string())
                };
                if !selected.is_empty() {
                    for o in selected {
                        fields.add(name, &option_value(o));
                    }
                } else if v.attr("multiple").is_none() {
                    if let Some(first) = options.first() {
                        fields.add(name, &option_value(first));
                    }
                }
            }
            "textarea" => fields.add(name, &el.text().collect::<String>()),
            _ => {}
        }
    }

    debug!(action = %action, fields = fields.len(), "parsed form");
    Some(FormState { action, fields })
}

/// Telerik list box client-state log entry.
#[derive(Debug, Serialize)]
struct LogEntry {
    #[serde(rename = "Type")]
    kind: u8,
    #[serde(rename = "Index")]
    index: usize,
    #[serde(rename = "Data", skip_serializing_if = "Option::is_none")]
    data: Option<ItemData>,
}

#[derive(Debug, Serialize)]
struct ItemData {
    text: String,
    value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListBoxClientState {
    log_entries: Vec<LogEntry>,
    selected_indices: Vec<usize>,
    checked_indices: Vec<usize>,
    scroll_position: u32,
}

const LOG_INSERT: u8 = 0;
const LOG_REMOVE: u8 = 1;

/// Client-state updates equivalent to clicking a list box "transfer all" button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub source_state: (String, String),
    pub destination_state: (String, String),
    pub items: Vec<String>,
}

/// Move every item of the list box owning `transfer_css` into the next list
/// box on the page, expressed as `<id>_ClientState` field values.
pub fn transfer_all(html: &str, transfer_css: &'static str) -> Option<Transfer> {
    let doc = Html::parse_document(html);
    let button_sel = selector(transfer_css)?;
    let listbox_sel = selector("div.RadListBox[id]")?;
    let item_sel = selector("li.rlbItem")?;

    let button = doc.select(&button_sel).next()?;
    let source = button
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| {
            el.value()
                .classes()
                .any(|c| c.eq_ignore_ascii_case("RadListBox"))
                && el.value().id().is_some()
        })?;
    let source_id = source.value().id()?.to_string();

    let listboxes: Vec<ElementRef<'_>> = doc.select(&listbox_sel).collect();
    let pos = listboxes
        .iter()
        .position(|lb| lb.value().id() == Some(source_id.as_str()))?;
    let destination = listboxes.get(pos + 1)?;
    let destination_id = destination.value().id()?.to_string();

    let items: Vec<String> = source
        .select(&item_sel)
        .map(|li| li.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    let existing = destination.select(&item_sel).count();

    let inserted = ListBoxClientState {
        log_entries: items
            .iter()
            .enumerate()
            .map(|(i, text)| LogEntry {
                kind: LOG_INSERT,
                index: existing + i,
                data: Some(ItemData {
                    text: text.clone(),
                    value: text.clone(),
                }),
            })
            .collect(),
        selected_indices: Vec::new(),
        checked_indices: Vec::new(),
        scroll_position: 0,
    };
    let removed = ListBoxClientState {
        log_entries: items
            .iter()
            .map(|_| LogEntry {
                kind: LOG_REMOVE,
                index: 0,
                data: None,
            })
            .collect(),
        selected_indices: Vec::new(),
        checked_indices: Vec::new(),
        scroll_position: 0,
    };

    let to_json = |state: &ListBoxClientState| serde_json::to_string(state).ok();
    Some(Transfer {
        source_state: (format!("{}_ClientState", source_id), to_json(&removed)?),
        destination_state: (format!("{}_ClientState", destination_id), to_json(&inserted)?),
        items,
    })
}

/// True when a response body is an HTML page rather than a data file.
pub fn looks_like_html(body: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&body[..body.len().min(512)]).to_ascii_lowercase();
    let head = head.trim_start();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<!DOCTYPE html>
<html><body>
<form method="post" action="./query.aspx" id="form1">
  <input type="hidden" name="__VIEWSTATE" value="abc123" />
  <input type="hidden" name="__EVENTTARGET" value="" />
  <input type="hidden" name="lbMembers_ClientState" value="" />
  <input type="hidden" name="lbSelected_ClientState" value="" />
  <div id="lbMembers" class="RadListBox RadListBox_Default">
    <ul class="rlbList">
      <li class="rlbItem"><span class="rlbText">France</span></li>
      <li class="rlbItem"><span class="rlbText">Japan</span></li>
    </ul>
    <div class="rlbButtonArea">
      <a class="rlbButton rlbTransferAllFrom" title="All to Right" href="#"></a>
    </div>
  </div>
  <div id="lbSelected" class="RadListBox RadListBox_Default">
    <ul class="rlbList"></ul>
  </div>
  <input id="rbArrBorr" type="radio" name="rblArrBorrOptions" value="ARRBORR"
         onclick="javascript:setTimeout('__doPostBack(\'rbArrBorr\',\'\')', 0)" />
  <input id="rbArrangements" type="radio" name="rblArrBorrOptions" value="ARR" checked="checked" />
  <input type="radio" name="rblArrBorr" value="BORROWINGS" />
  <input id="cblBorrowings_0" type="checkbox" name="cblBorrowings$0" checked="checked" />
  <select name="ddlYear"><option value="2024">2024</option><option value="2025" selected>2025</option></select>
  <input id="btnSubmit" type="submit" name="btnSubmit" value="Submit" />
  <a id="lbnTSV" href="javascript:__doPostBack('lbnTSV','')">TSV</a>
</form>
</body></html>"##;

    fn page_url() -> Url {
        Url::parse("https://www.imf.org/external/np/fin/tad/query.aspx").unwrap()
    }

    #[test]
    fn parses_hidden_checked_and_selected_fields() {
        let form = parse_form(PAGE, &page_url()).unwrap();
        assert_eq!(form.action.as_str(), "https://www.imf.org/external/np/fin/tad/query.aspx");
        assert_eq!(form.fields.get("__VIEWSTATE"), Some("abc123"));
        assert_eq!(form.fields.get("rblArrBorrOptions"), Some("ARR"));
        assert_eq!(form.fields.get("cblBorrowings$0"), Some("on"));
        assert_eq!(form.fields.get("ddlYear"), Some("2025"));
        // unchecked radios and submit buttons are not posted
        assert_eq!(form.fields.get("rblArrBorr"), None);
        assert_eq!(form.fields.get("btnSubmit"), None);
    }

    #[test]
    fn page_without_form_is_none() {
        assert!(parse_form("<html><body>maintenance</body></html>", &page_url()).is_none());
    }

    #[test]
    fn locate_uses_fallback_when_primary_missing() {
        let found = locate(
            PAGE,
            &["#rbBorrowings", "input[value='BORROWINGS'][name='rblArrBorr']"],
        )
        .unwrap();
        assert_eq!(found.matched_by, "input[value='BORROWINGS'][name='rblArrBorr']");
        assert_eq!(found.name.as_deref(), Some("rblArrBorr"));
        assert_eq!(found.submitted_value(), "BORROWINGS");

        let primary = locate(PAGE, &["#rbArrBorr", "input[name='rblArrBorrOptions']"]).unwrap();
        assert_eq!(primary.matched_by, "#rbArrBorr");
    }

    #[test]
    fn locate_returns_none_when_all_strategies_fail() {
        assert!(locate(PAGE, &["#rbCurrent", "input[value='ACTIVE']"]).is_none());
    }

    #[test]
    fn postback_targets_from_links_and_auto_postback_controls() {
        let link = locate(PAGE, &["#lbnTSV"]).unwrap();
        assert_eq!(link.postback(), Some(("lbnTSV".to_string(), String::new())));

        let radio = locate(PAGE, &["#rbArrBorr"]).unwrap();
        assert_eq!(radio.postback(), Some(("rbArrBorr".to_string(), String::new())));

        assert_eq!(
            postback_target("javascript:__doPostBack('ctl00$grid','Page$2')"),
            Some(("ctl00$grid".to_string(), "Page$2".to_string()))
        );
        assert_eq!(postback_target("#"), None);
    }

    #[test]
    fn transfer_all_moves_items_to_next_list_box() {
        let transfer = transfer_all(PAGE, "a.rlbTransferAllFrom").unwrap();
        assert_eq!(transfer.items, vec!["France", "Japan"]);
        assert_eq!(transfer.source_state.0, "lbMembers_ClientState");
        assert_eq!(transfer.destination_state.0, "lbSelected_ClientState");

        let dest: serde_json::Value = serde_json::from_str(&transfer.destination_state.1).unwrap();
        assert_eq!(dest["logEntries"].as_array().unwrap().len(), 2);
        assert_eq!(dest["logEntries"][1]["Data"]["text"], "Japan");
        assert_eq!(dest["logEntries"][1]["Index"], 1);
    }

    #[test]
    fn field_set_replaces_and_add_appends() {
        let mut fields = FormFields::default();
        fields.add("a", "1");
        fields.add("a", "2");
        fields.add("b", "x");
        fields.set("a", "3");
        assert_eq!(
            fields.pairs().to_vec(),
            vec![
                ("a".to_string(), "3".to_string()),
                ("b".to_string(), "x".to_string())
            ]
        );
        fields.add("b", "y");
        assert!(fields.contains("b", "y"));
        fields.remove("b");
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn detects_html_bodies() {
        assert!(looks_like_html(b"  <!DOCTYPE html><html></html>"));
        assert!(looks_like_html(b"<HTML><body>error</body>"));
        assert!(!looks_like_html(b"IMF Financial Data\tAs of: June 30, 2025"));
        assert!(!looks_like_html(b""));
    }
}
