//! Prompt construction. Pure functions from configuration to instruction text.

use std::collections::BTreeMap;

use crate::types::{ArticleConfig, ArticleType, Audience, Message, ReviewStep, WritingStyle};

/// Values substituted into `{key}` placeholders.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    data: BTreeMap<String, String>,
}

impl PromptContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

/// Replace `{key}` placeholders with values from the context.
///
/// Unknown placeholders are left as-is. The template is scanned once, so
/// braces inside substituted values are never expanded.
pub fn render(template: &str, context: &PromptContext) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let tail = &rest[open..];
        let value = tail
            .find('}')
            .and_then(|close| context.get(&tail[1..close]).map(|value| (close, value)));
        match value {
            Some((close, value)) => {
                rendered.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                rendered.push('{');
                rest = &tail[1..];
            }
        }
    }
    rendered.push_str(rest);
    rendered
}

/// Wrap text in a labeled section for structured prompts.
pub fn section(label: &str, content: &str) -> String {
    format!("## {}\n\n{}", label, content)
}

const SYSTEM_PROMPT: &str = "You are a seasoned writer and editor. You write the way people talk: \
short sentences, concrete examples, personal opinions where they help, and no filler. \
Never invent facts, numbers or case studies that are not in the material you are given. \
Avoid stock phrases such as \"in today's fast-paced world\" or \"it is worth noting\". \
Always answer with the article in Markdown and nothing else.";

const GENERATE_TEMPLATE: &str = "## Task

Write a high-quality {article_type} based on the source material below.

## Process

1. Read all of the material and pull out the core theme, the usable facts and the interesting angles. Do not output this analysis.
2. Plan the outline: one central claim, 3-5 sections, an opening hook and a closing note. Do not output the outline.
3. Write the full article.

## Parameters

- **Article type**: {article_type}
- **Audience**: {audience}
- **Length**: {word_count} words
- **Style**: {style}

{structure}
{extra}
## Output

1. Output the article body in Markdown only, with no explanation before or after it.
2. The article must start with a level-one `#` title.
3. Keep paragraphs short and headings informative.";

pub fn system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

fn article_type_label(article_type: ArticleType) -> &'static str {
    match article_type {
        ArticleType::Wechat => "WeChat official-account article",
        ArticleType::Blog => "blog post",
        ArticleType::Newsletter => "newsletter issue",
        ArticleType::Tutorial => "tutorial",
    }
}

fn article_type_structure(article_type: ArticleType) -> &'static str {
    match article_type {
        ArticleType::Wechat => "### Structure\n- A catchy but honest title\n- Hook the reader in the first 2-3 sentences\n- 3-5 sections, each with an informative subheading\n- Short paragraphs suited to reading on a phone\n- End with a brief takeaway or an open question, not a slogan",
        ArticleType::Blog => "### Structure\n- A clear title that says what the reader will learn\n- State the problem up front\n- Deeper analysis is fine; code or configuration snippets are welcome\n- Use subheadings and lists for scanning\n- Close with next steps or further reading",
        ArticleType::Newsletter => "### Structure\n- Conversational, like a letter\n- Open with a recent observation that leads into the topic\n- Focus on 1-3 core ideas, 2-3 paragraphs each\n- End by inviting replies or teasing the next issue",
        ArticleType::Tutorial => "### Structure\n- Title of the form \"How to ...\"\n- Say what the reader will be able to do, the prerequisites and the time needed\n- Numbered steps, each with what, why and common pitfalls\n- Call out warnings separately\n- Finish with a checklist",
    }
}

fn audience_label(audience: Audience) -> &'static str {
    match audience {
        Audience::Tech => "engineers and developers",
        Audience::Pm => "product managers and designers",
        Audience::Startup => "founders and business readers",
        Audience::General => "general internet readers",
    }
}

fn style_description(style: WritingStyle) -> &'static str {
    match style {
        WritingStyle::Casual => "relaxed, like chatting with a friend; first person is welcome",
        WritingStyle::Professional => "professional without being stiff; explain jargon in plain words",
        WritingStyle::Humorous => "witty, with natural analogies; never force the jokes",
    }
}

/// Instruction for the drafting stage.
pub fn generate_prompt(config: &ArticleConfig) -> String {
    let extra = config.extra_instructions.trim();
    let extra = if extra.is_empty() {
        String::new()
    } else {
        format!("\n{}\n", section("Additional requirements", extra))
    };

    let context = PromptContext::new()
        .insert("article_type", article_type_label(config.article_type))
        .insert("audience", audience_label(config.audience))
        .insert("word_count", config.word_count.trim())
        .insert("style", style_description(config.style))
        .insert("structure", article_type_structure(config.article_type))
        .insert("extra", extra);

    render(GENERATE_TEMPLATE, &context)
}

/// Instruction for one review pass.
pub fn review_prompt(step: ReviewStep) -> &'static str {
    match step {
        ReviewStep::Content => "## Review pass 1: content\n\nCheck the article below for factual accuracy, logical flow and structure. \
Remove claims that are not supported by the text, fix gaps in the argument and reorder sections if the flow breaks. \
Output the complete revised article in Markdown and nothing else.",
        ReviewStep::Style => "## Review pass 2: style\n\nRemove stock phrases and machine-sounding wording, split long sentences, \
make the voice consistent and conversational. Keep the meaning and structure unchanged. \
Output the complete revised article in Markdown and nothing else.",
        ReviewStep::Detail => "## Review pass 3: details\n\nPolish punctuation, spacing between scripts, heading levels, list formatting and typos. \
Do not rewrite content. Output the complete revised article in Markdown and nothing else.",
    }
}

/// Instruction for a free-form revision.
pub fn revise_prompt(instruction: &str) -> String {
    format!(
        "## Revision request\n\nRevise the article below according to this instruction:\n\n> {}\n\n\
Change only what the instruction asks for and keep everything else intact. \
Output the complete revised article in Markdown and nothing else.",
        instruction.trim()
    )
}

fn stage_messages(stage_prompt: &str, heading: &str, material: &str) -> Vec<Message> {
    vec![
        Message::system(system_prompt()),
        Message::user(format!("{}\n\n---\n\n{}", stage_prompt, section(heading, material))),
    ]
}

pub fn generate_messages(source: &str, config: &ArticleConfig) -> Vec<Message> {
    stage_messages(&generate_prompt(config), "Source material", source)
}

pub fn review_messages(article: &str, step: ReviewStep) -> Vec<Message> {
    stage_messages(review_prompt(step), "Article to review", article)
}

pub fn revise_messages(article: &str, instruction: &str) -> Vec<Message> {
    stage_messages(&revise_prompt(instruction), "Current article", article)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn test_render_basic() {
        let ctx = PromptContext::new().insert("name", "Alice");
        assert_eq!(render("Hello {name}, {missing}", &ctx), "Hello Alice, {missing}");
    }

    #[test]
    fn test_render_does_not_expand_values() {
        let ctx = PromptContext::new()
            .insert("extra", "keep {style} literal, {{x}}")
            .insert("style", "casual");
        assert_eq!(
            render("{extra} / {style} / {", &ctx),
            "keep {style} literal, {{x}} / casual / {"
        );
    }

    #[test]
    fn test_generate_prompt_keeps_braces_in_extra() {
        let config = ArticleConfig::default().with_extra_instructions("mention {word_count} and {structure}");
        let prompt = generate_prompt(&config);
        assert!(prompt.contains("mention {word_count} and {structure}"));
    }

    #[test]
    fn test_section() {
        assert_eq!(section("Context", "Some knowledge"), "## Context\n\nSome knowledge");
    }

    #[test]
    fn test_generate_prompt_uses_config() {
        let config = ArticleConfig::default()
            .with_article_type(ArticleType::Tutorial)
            .with_audience(Audience::Tech)
            .with_word_count("1500-2000")
            .with_extra_instructions("  mention Rust  ");
        let prompt = generate_prompt(&config);
        assert!(prompt.contains("tutorial"));
        assert!(prompt.contains("engineers and developers"));
        assert!(prompt.contains("1500-2000 words"));
        assert!(prompt.contains("## Additional requirements\n\nmention Rust"));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn test_generate_prompt_without_extra() {
        let prompt = generate_prompt(&ArticleConfig::default());
        assert!(!prompt.contains("Additional requirements"));
    }

    #[test]
    fn test_stage_messages_shape() {
        let messages = review_messages("# Title\n\nBody.", ReviewStep::Style);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.starts_with("## Review pass 2: style"));
        assert!(messages[1]
            .content
            .ends_with("---\n\n## Article to review\n\n# Title\n\nBody."));
    }

    #[test]
    fn test_revise_messages_carry_instruction() {
        let messages = revise_messages("text", "  make it shorter ");
        assert!(messages[1].content.contains("> make it shorter\n"));
        assert!(messages[1].content.ends_with("## Current article\n\ntext"));
    }
}
