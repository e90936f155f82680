use std::collections::HashSet;

use regex::Regex;
use scraper::{Html, Selector};

const LINK_PREFIXES: &[&str] = &["tel:", "call:", "callto:", "phone:"];

/// ITU calling codes (1-3 digits), used to spot international numbers
/// written without a leading "+" or "00". Longest prefix wins.
#[rustfmt::skip]
const COUNTRY_CODES: &[&str] = &[
    // Europe
    "30", "31", "32", "33", "34", "36", "39", "40", "41", "43", "44", "45",
    "46", "47", "48", "49", "350", "351", "352", "353", "354", "355", "356",
    "357", "358", "359", "370", "371", "372", "373", "375", "376", "377",
    "378", "380", "381", "382", "383", "385", "386", "387", "389", "420",
    "421", "423", "7",
    // Overseas territories
    "247", "262", "290", "297", "298", "299", "500", "508", "590", "594",
    "596", "599", "672", "681", "682", "683", "687", "689", "690", "721",
    // Americas
    "1", "51", "52", "53", "54", "55", "56", "57", "58", "501", "502",
    "503", "504", "505", "506", "507", "509", "591", "593", "595", "598",
    // Asia & Middle East
    "60", "62", "63", "65", "66", "81", "82", "84", "86", "90", "91", "92",
    "93", "94", "95", "98", "374", "670", "673", "852", "853", "855", "856",
    "880", "886", "960", "961", "962", "963", "964", "965", "966", "967",
    "968", "970", "971", "972", "973", "974", "975", "977", "992", "993",
    "994", "995", "996", "998",
    // Africa
    "20", "27", "212", "213", "216", "218", "221", "223", "225", "226",
    "227", "228", "229", "230", "231", "232", "233", "234", "235", "236",
    "237", "238", "239", "240", "241", "242", "243", "244", "245", "246",
    "248", "249", "250", "251", "252", "253", "254", "255", "256", "257",
    "258", "260", "261", "263", "264", "265", "266", "267", "268", "269",
    // Oceania
    "61", "64", "675", "676", "677", "678", "679", "680", "685", "686",
    "688", "691", "692",
];

/// Phones from tel-family links (authoritative when present) or page text,
/// normalized and filtered of coordinate/ID artefacts.
pub fn extract(doc: &Html, text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    let sel = Selector::parse("a[href]").unwrap();
    for a in doc.select(&sel) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let Some(raw) = LINK_PREFIXES
            .iter()
            .find_map(|prefix| href.strip_prefix(prefix))
        else {
            continue;
        };
        if let Some(phone) = normalize(raw.trim()) {
            if seen.insert(phone.clone()) {
                found.push(phone);
            }
        }
    }
    if !found.is_empty() {
        return found;
    }

    let patterns = [
        r"\+33\s*[1-9](?:[\s.-]*\d{2}){4}", // +33 4 91 54 19 52
        r"0[1-9](?:[\s.-]*\d{2}){4}",       // 04 91 54 19 52
        r"\b0[1-9]\d{8}\b",                 // 0491541952
    ];
    let regexes: Vec<Regex> = patterns.iter().map(|p| Regex::new(p).unwrap()).collect();
    let decimal = Regex::new(r"^\d+\.\d{4,}").unwrap();

    for line in text.lines() {
        if looks_like_coordinates(line) {
            continue;
        }
        for re in &regexes {
            for m in re.find_iter(line) {
                let raw = m.as_str();
                let digit_count = raw.chars().filter(|c| c.is_ascii_digit()).count();
                if digit_count < 9 {
                    continue;
                }
                if !raw.trim_start().starts_with(['+', '0']) {
                    continue;
                }
                // "5.378054"-style decimals sneak past the digit patterns.
                if (raw.contains('.') || raw.contains(','))
                    && decimal.is_match(&raw.replace(',', "."))
                {
                    continue;
                }
                if let Some(phone) = normalize(raw) {
                    if seen.insert(phone.clone()) {
                        found.push(phone);
                    }
                }
            }
        }
    }

    found.retain(|p| !is_artefact(p));
    found
}

/// Normalize toward E.164, only when the international format is explicit.
///
/// - `00XXXXXXXXXXX` -> `+XXXXXXXXXXX` (European international prefix)
/// - `+XXXXXXXXXXX`  -> kept as-is
/// - 11+ digits starting with a known calling code -> `+` prefixed
/// - `0XXXXXXXXX` (10 digits, local) -> kept verbatim: the country is unknown
pub fn normalize(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    // Trunk-zero insertions: "(0)", "[ 0 ]" and friends.
    let zero = Regex::new(r"[\(\[]\s*0\s*[\)\]]").unwrap();
    let phone = zero.replace_all(raw, "").to_string();
    let trimmed = phone.trim();

    let mut international = false;
    let mut digits: String = if let Some(rest) = trimmed.strip_prefix("00") {
        international = true;
        rest.chars().filter(|c| c.is_ascii_digit()).collect()
    } else if let Some(rest) = trimmed.strip_prefix('+') {
        international = true;
        rest.chars().filter(|c| c.is_ascii_digit()).collect()
    } else {
        trimmed.chars().filter(|c| c.is_ascii_digit()).collect()
    };

    if digits.len() < 9 || digits.len() > 15 {
        return None;
    }

    // Local numbers keep their exact form.
    if !international && digits.starts_with('0') && digits.len() == 10 {
        return Some(digits);
    }

    if !international && digits.len() >= 11 {
        for len in [3, 2, 1] {
            if COUNTRY_CODES.contains(&&digits[..len]) {
                international = true;
                break;
            }
        }
    }

    if !international {
        return Some(digits);
    }

    // "+33 (0)4 ..." scraped as 3304...: drop the stray trunk zero.
    if digits.starts_with("330") && digits.len() == 12 {
        digits = format!("33{}", &digits[3..]);
    }
    let cc_zero = Regex::new(r"^(\d{2,3})0(\d{9})$").unwrap();
    let fixed = cc_zero.captures(&digits).and_then(|caps| {
        COUNTRY_CODES
            .contains(&&caps[1])
            .then(|| format!("{}{}", &caps[1], &caps[2]))
    });
    if let Some(fixed) = fixed {
        digits = fixed;
    }

    if digits.len() >= 10 {
        Some(format!("+{}", digits))
    } else {
        None
    }
}

/// Collapse numbers sharing a trailing 9-digit core, so "+33479059522" and
/// "0479059522" count once. First spelling wins.
pub fn dedupe(phones: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for phone in phones {
        let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
        let core = if digits.len() >= 9 {
            digits[digits.len() - 9..].to_string()
        } else {
            digits
        };
        if seen.insert(core) {
            out.push(phone);
        }
    }
    out
}

fn looks_like_coordinates(line: &str) -> bool {
    let gps = Regex::new(r"[-+]?\d{1,3}\.\d{4,}").unwrap();
    if gps.find_iter(line).count() >= 2 {
        return true;
    }
    let markers = Regex::new(r"(?i)latitude|longitude|\blat\b|\blon\b|coords?|gps|°").unwrap();
    markers.is_match(line)
}

/// Repeated-digit and ascending-sequence strings are IDs, not phones.
fn is_artefact(phone: &str) -> bool {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let distinct: HashSet<char> = digits.chars().collect();
    distinct.len() <= 1 || "01234567890123456789".contains(&digits)
}

// ── Tests ──
