//! Layout normalizer: deterministic reflow of a finished Markdown article.
//!
//! Repairs heading syntax, keeps headings on their own block, splits overlong
//! heading lines and breaks long paragraphs into groups of at most two
//! sentences. Pure and idempotent; lengths are counted in `char`s.

use once_cell::sync::Lazy;
use regex::Regex;

const HARD_STOPS: &[char] = &['。', '！', '？', '!', '?'];
const SOFT_STOPS: &[char] = &['，', ',', ':', '：', '；', ';'];

const SHORT_HEADING: usize = 28;
const FALLBACK_HEADING_LEN: usize = 45;
const FALLBACK_CUT: usize = 22;
const PARAGRAPH_MIN: usize = 90;
const GROUP_MAX: usize = 110;
const GROUP_SENTENCES: usize = 2;
const MAX_PASSES: usize = 8;

static TRAILING_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)[ \t]+$").unwrap());
static GLUED_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|\n)(#{1,6})([^\s#])").unwrap());
static HEADING_AFTER_STOP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([。！？!?；;])\s*(#{1,6}\s*)").unwrap());
static HEADING_AFTER_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([^\n])\n(#{1,6}\s)").unwrap());
static HEADING_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s.+").unwrap());
static BLOCK_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());
static HEADING_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s").unwrap());
static HEADING_PARTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s*(.+)$").unwrap());
static VERBATIM_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[-*+]\s|\d+\.\s|>\s|```)").unwrap());
static NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n+").unwrap());
static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static REST_LEAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\s，,:：。！？!?]+").unwrap());

/// Normalize an article's layout.
///
/// A single pass can leave work for a second one (a split heading title may
/// itself be splittable), so passes repeat until the text stops changing.
pub fn normalize(text: &str) -> String {
    let mut current = layout_pass(text);
    for _ in 1..MAX_PASSES {
        let next = layout_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn layout_pass(input: &str) -> String {
    let text = input.replace("\r\n", "\n").replace('\r', "\n");
    let text = TRAILING_WS.replace_all(&text, "");
    let text = GLUED_HEADING.replace_all(&text, "${1}${2} ${3}");
    let text = HEADING_AFTER_STOP.replace_all(&text, "${1}\n\n${2}");
    let text = HEADING_AFTER_LINE.replace_all(&text, "${1}\n\n${2}");
    let text = pad_heading_lines(&text);

    let blocks: Vec<String> = BLOCK_BREAK
        .split(&text)
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| {
            if HEADING_BLOCK.is_match(block) {
                split_heading(block)
            } else if VERBATIM_BLOCK.is_match(block) {
                block.to_string()
            } else {
                split_paragraph(block)
            }
        })
        .collect();

    let joined = blocks.join("\n\n");
    EXCESS_NEWLINES.replace_all(&joined, "\n\n").trim().to_string()
}

/// Make sure every heading line is followed by a blank line.
fn pad_heading_lines(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut out = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        out.push(*line);
        let next_is_text = lines.get(i + 1).is_some_and(|next| !next.is_empty());
        if next_is_text && HEADING_LINE.is_match(line) {
            out.push("");
        }
    }
    out.join("\n")
}

fn is_hard_stop(c: char) -> bool {
    HARD_STOPS.contains(&c)
}

fn is_soft_stop(c: char) -> bool {
    SOFT_STOPS.contains(&c)
}

fn first_in_range(body: &[char], stop: fn(char) -> bool, min: usize, max: usize) -> Option<usize> {
    body.iter()
        .enumerate()
        .skip(min)
        .take_while(|(i, _)| *i <= max)
        .find(|(_, c)| stop(**c))
        .map(|(i, _)| i)
}

fn cut_index(body: &[char]) -> Option<usize> {
    first_in_range(body, is_hard_stop, 10, 42)
        .or_else(|| first_in_range(body, is_soft_stop, 10, 34))
        .or_else(|| first_in_range(body, is_hard_stop, 8, 60))
        .or_else(|| first_in_range(body, is_soft_stop, 8, 48))
        .or_else(|| (body.len() >= FALLBACK_HEADING_LEN).then_some(FALLBACK_CUT))
}

/// Split an overlong heading into a short title and a paragraph below it.
///
/// Never produces an empty title or an empty remainder; without a usable cut
/// point the heading is returned whole.
pub fn split_heading(block: &str) -> String {
    let Some(caps) = HEADING_PARTS.captures(block) else {
        return block.trim().to_string();
    };
    let level = &caps[1];
    let body = caps[2].trim();
    if body.is_empty() {
        return format!("{} ", level);
    }

    let chars: Vec<char> = body.chars().collect();
    if chars.len() <= SHORT_HEADING && !chars.iter().any(|c| is_hard_stop(*c)) {
        return format!("{} {}", level, body);
    }

    let Some(cut) = cut_index(&chars) else {
        return format!("{} {}", level, body);
    };

    let title: String = chars[..cut].iter().collect();
    let rest: String = chars.get(cut + 1..).unwrap_or_default().iter().collect();
    let title = title.trim();
    let rest = REST_LEAD.replace(&rest, "");
    let rest = rest.trim();

    if title.is_empty() || rest.is_empty() {
        return format!("{} {}", level, body);
    }
    format!("{} {}\n\n{}", level, title, rest)
}

/// Sentences in order, each keeping its run of closing stops and any
/// whitespace that preceded it.
fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        let run_ends = chars.peek().is_none_or(|next| !is_hard_stop(*next));
        if is_hard_stop(c) && run_ends {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        out.push(current);
    }
    out
}

/// Break a long paragraph into groups of at most two sentences.
///
/// A group is closed early when adding the next sentence would push it past
/// 110 characters; a single sentence longer than that stays whole.
pub fn split_paragraph(block: &str) -> String {
    let compact = NEWLINES.replace_all(block, " ");
    let compact = compact.trim();
    if compact.chars().count() < PARAGRAPH_MIN {
        return compact.to_string();
    }

    let sentences = sentences(compact);
    if sentences.len() < 2 {
        return compact.to_string();
    }

    let mut groups: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;

    for sentence in sentences {
        if sentence.trim().is_empty() {
            continue;
        }
        if current.is_empty() {
            current = sentence.trim_start().to_string();
            count = 1;
            continue;
        }

        let next = format!("{}{}", current, sentence);
        if next.trim_end().chars().count() > GROUP_MAX || count >= GROUP_SENTENCES {
            groups.push(current.trim().to_string());
            current = sentence.trim_start().to_string();
            count = 1;
        } else {
            current = next;
            count += 1;
        }
    }
    if !current.trim().is_empty() {
        groups.push(current.trim().to_string());
    }

    groups.join("\n\n")
}
