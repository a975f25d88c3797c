//! Schema-driven report renderer: one analysis payload in, one self-contained
//! styled document out. Pure and total; missing fields render as empty
//! sections, never as errors, because the payload is best-effort by design.

pub mod html;

use html::{address_link, escape, Html};
use itertools::Itertools;
use serde_json::Value;

/// Rule-engine entries count as rule source when their text starts with this.
const RULE_PREFIX: &str = "rule ";

/// Fixed section order: threat summary, dynamic analysis, IOCs, yara rule,
/// packer information.
pub fn render(payload: &Value) -> String {
    let mut doc = Html::new();
    threat_summary(&mut doc, payload);
    dynamic_analysis(&mut doc, payload);
    iocs(&mut doc, payload);
    yara_rule(&mut doc, payload);
    packer_information(&mut doc, payload);
    doc.finish()
}

/// Empty slice for anything that is not an array, so sections degrade to
/// empty instead of erroring.
fn array<'a>(value: &'a Value) -> &'a [Value] {
    value.as_array().map(Vec::as_slice).unwrap_or_default()
}

fn text(value: &Value) -> &str {
    value.as_str().unwrap_or_default()
}

fn threat_summary(doc: &mut Html, payload: &Value) {
    let results = &payload["threat_summary"]["results"];

    doc.section("Threat Summary");
    let threat = &results["threat_level"];
    let score = match &threat["score"] {
        Value::Number(n) => n.to_string(),
        other => text(other).to_string(),
    };
    doc.kv("Score", &score);
    doc.p("Indicators:");
    doc.open("ul");
    for signature in array(&threat["signatures"]) {
        doc.tag("li/span", text(signature));
    }
    doc.close("ul");
}

fn dynamic_analysis(doc: &mut Html, payload: &Value) {
    doc.section("Dynamic Analysis");
    doc.open("p");
    doc.open("table");

    doc.open("tr");
    doc.tag("td/u", "Return Address");
    doc.tag("td/u", "Module");
    doc.tag("td/u", "Function");
    doc.close("tr");

    for entry in array(&payload["dynamic_analysis"]["parsed_output"]) {
        doc.open("tr");

        doc.open("td");
        doc.open("code");
        doc.raw(&address_link(text(&entry["location"])));
        doc.close("code");
        doc.close("td");

        doc.tag("td/p", text(&entry["dll_name"]));

        doc.open("td");
        doc.open("code");
        doc.raw(&call_summary(entry));
        doc.close("code");
        doc.close("td");

        doc.close("tr");
    }

    doc.close("table");
    doc.close("p");
}

/// `function(arg, arg) -> return`, with the function name highlighted when
/// flagged suspicious. Arguments are escaped plain text in original order;
/// the return value gets the address cross-reference, arguments do not.
fn call_summary(entry: &Value) -> String {
    let mut summary = String::new();

    let suspicious = entry["known_suspicious_function"].as_bool().unwrap_or(false);
    if suspicious {
        summary.push_str("<span style=\"color: orange;\">");
    }
    summary.push_str("<b>");
    summary.push_str(&escape(text(&entry["function_called"])));
    summary.push_str("</b>");
    if suspicious {
        summary.push_str("</span>");
    }

    summary.push('(');
    let args = array(&entry["arguments_passed"])
        .iter()
        .map(|arg| escape(text(arg)))
        .join(", ");
    summary.push_str(&args);
    summary.push(')');

    let result = text(&entry["function_return_value"]);
    if !result.is_empty() && result.to_lowercase() != "none" {
        summary.push_str(" -> ");
        summary.push_str(&address_link(result));
    }

    summary
}

fn iocs(doc: &mut Html, payload: &Value) {
    doc.section("IOCs");

    doc.tag("h2", "Hashes");
    doc.open("p");
    doc.open("table");

    doc.open("tr");
    doc.tag("td/u", "Algorithm");
    doc.tag("td/u", "Hash");
    doc.close("tr");

    // payload key order, not sorted
    if let Some(hashes) = payload["hashes"].as_object() {
        for (algorithm, hash) in hashes {
            doc.open("tr");
            doc.tag("td/b", algorithm);
            doc.tag("td/code", text(hash));
            doc.close("tr");
        }
    }
    doc.close("table");
    doc.close("p");

    doc.tag("h2", "Strings");
    let strings = &payload["threat_summary"]["results"]["iocs"]["strings"];
    doc.open("ul");
    for entry in array(strings) {
        doc.tag("li/code", text(entry));
    }
    doc.close("ul");
}

/// Only the first entry carrying rule source text is rendered; if none
/// matches the section is omitted entirely, heading included.
fn yara_rule(doc: &mut Html, payload: &Value) {
    for entry in array(&payload["yara_rules"]["results"]) {
        let pair = array(entry);
        let source = text(pair.get(1).unwrap_or(&Value::Null));
        if source.starts_with(RULE_PREFIX) {
            doc.section("Yara rule");
            doc.tag("pre", &source.replace('\t', "  "));
            return;
        }
    }
}

fn packer_information(doc: &mut Html, payload: &Value) {
    doc.section("Packer Information");
    doc.open("ul");
    for entry in array(&payload["packer_information"]["results"]) {
        let percent = text(&entry["percent"]);
        let name = text(&entry["packer_name"]);
        doc.tag("li/span", &format!("[{percent}] {name}"));
    }
    doc.close("ul");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_payload() -> Value {
        json!({
            "status": "done",
            "threat_summary": {
                "results": {
                    "threat_level": {
                        "score": "8.5",
                        "signatures": ["packed section", "anti-debug <check>"],
                    },
                    "iocs": {
                        "strings": ["http://evil.example/c2"],
                    },
                }
            },
            "hashes": {
                "md5": "d41d8cd98f00b204e9800998ecf8427e",
                "sha1": "da39a3ee5e6b4b0d3255bfef95601890afd80709",
                "sha256": "e3b0c44298fc1c149afbf4c8996fb924",
            },
            "yara_rules": {
                "results": [
                    ["meta_match", "matched 3 rules"],
                    ["upx_rule", "rule UPX {\n\tstrings:\n}"],
                    ["other_rule", "rule Other {}"],
                ]
            },
            "packer_information": {
                "results": [
                    {"percent": "87.5", "packer_name": "UPX"},
                ]
            },
            "dynamic_analysis": {
                "parsed_output": [
                    {
                        "location": "0x401000",
                        "dll_name": "kernel32.dll",
                        "function_called": "VirtualAlloc",
                        "known_suspicious_function": true,
                        "arguments_passed": ["0x0", "4096", "<reserve>"],
                        "function_return_value": "0x7ffe0000",
                    },
                    {
                        "location": "unresolved",
                        "dll_name": "user32.dll",
                        "function_called": "MessageBoxA",
                        "known_suspicious_function": false,
                        "arguments_passed": [],
                        "function_return_value": "None",
                    },
                ]
            },
        })
    }

    #[test]
    fn render_is_deterministic() {
        let payload = sample_payload();
        assert_eq!(render(&payload), render(&payload));
    }

    #[test]
    fn sections_in_fixed_order() {
        let out = render(&sample_payload());
        let summary = out.find("Threat Summary").unwrap();
        let dynamic = out.find("Dynamic Analysis").unwrap();
        let iocs = out.find("IOCs").unwrap();
        let yara = out.find("Yara rule").unwrap();
        let packer = out.find("Packer Information").unwrap();
        assert!(summary < dynamic && dynamic < iocs && iocs < yara && yara < packer);
    }

    #[test]
    fn empty_payload_still_renders() {
        let out = render(&json!({}));
        assert!(out.contains("<h1>Threat Summary</h1>"));
        assert!(out.contains("<h1>Dynamic Analysis</h1>"));
        assert!(out.contains("<h1>Packer Information</h1>"));
        // no matching rule text, so no yara section at all
        assert!(!out.contains("Yara rule"));
    }

    #[test]
    fn missing_dynamic_analysis_renders_empty_table() {
        let mut payload = sample_payload();
        payload.as_object_mut().unwrap().remove("dynamic_analysis");
        let out = render(&payload);
        assert!(out.contains("<td><u>Return Address</u></td>"));
        assert!(!out.contains("VirtualAlloc"));
    }

    #[test]
    fn locations_and_returns_linked_arguments_not() {
        let out = render(&sample_payload());
        assert!(out.contains("<a href=\"address://0x401000\">0x401000</a>"));
        assert!(out.contains("<a href=\"address://0x7FFE0000\">0x7ffe0000</a>"));
        // unparseable location stays escaped plain text
        assert!(out.contains("<code>unresolved</code>"));
        // argument "0x0" would parse, but arguments never get links
        assert!(out.contains("0x0, 4096, &lt;reserve&gt;"));
        assert!(!out.contains("address://0x0\""));
    }

    #[test]
    fn suspicious_functions_highlighted() {
        let out = render(&sample_payload());
        assert!(out.contains("<span style=\"color: orange;\"><b>VirtualAlloc</b></span>"));
        assert!(out.contains("<b>MessageBoxA</b>("));
        assert!(!out.contains("orange;\"><b>MessageBoxA"));
    }

    #[test]
    fn none_return_value_suppressed() {
        let out = render(&sample_payload());
        assert!(!out.contains("MessageBoxA</b>() -&gt; "));
        assert!(!out.contains("MessageBoxA</b>() -> "));
    }

    #[test]
    fn hashes_keep_payload_key_order() {
        let out = render(&sample_payload());
        let md5 = out.find("<td><b>md5</b></td>").unwrap();
        let sha1 = out.find("<td><b>sha1</b></td>").unwrap();
        let sha256 = out.find("<td><b>sha256</b></td>").unwrap();
        assert!(md5 < sha1 && sha1 < sha256);

        // reversed payload order must come out reversed
        let reversed: Value =
            serde_json::from_str(r#"{"hashes": {"sha256": "b", "md5": "a"}}"#).unwrap();
        let out = render(&reversed);
        assert!(out.find("sha256").unwrap() < out.find("md5").unwrap());
    }

    #[test]
    fn first_rule_text_wins_tabs_expanded() {
        let out = render(&sample_payload());
        // "meta_match" text lacks the prefix, UPX is the first real rule
        assert!(out.contains("<pre>rule UPX {\n  strings:\n}</pre>"));
        assert!(!out.contains("rule Other"));
    }

    #[test]
    fn score_accepts_numbers() {
        let out = render(&json!({
            "threat_summary": {"results": {"threat_level": {"score": 7}}}
        }));
        assert!(out.contains("<p>Score: 7</p>"));
    }

    #[test]
    fn signatures_render_as_escaped_list() {
        let out = render(&sample_payload());
        assert!(out.contains("<li><span>anti-debug &lt;check&gt;</span></li>"));
        assert!(out.contains("<li><code>http://evil.example/c2</code></li>"));
    }
}
