// Prompt text sent with every card generation call.
// The tag rules here mirror what the normalizer accepts; keep them in sync.

/// System prompt fixing the JSON shape and the HTML vocabulary.
pub const CARD_SYSTEM: &str = "\
You write short, upbeat social media posts in the style of lifestyle sharing apps. \
Respond with a single JSON object and nothing else: \
{\"title\": \"...\", \"content\": \"...\"}. \
The title is at most 20 characters and includes an emoji. \
The content is HTML using only these tags: \
<p> for each paragraph, and every paragraph starts with an emoji; \
<strong> for emphasis; <span class=\"highlight\"> for key words; \
<ul> and <li> for lists. Never use <em>. \
Lists must sit outside paragraphs, never inside a <p>. \
Inline tags (<strong>, <span>) must never contain block tags (<p>, <ul>, <li>). \
Close every tag. Escape double quotes inside the JSON string.";

/// Per-request instructions. Placeholders: `{topic}`, `{keyword}`.
pub const CARD_USER_TEMPLATE: &str = "\
Write a post about \"{topic}\" focused on \"{keyword}\". Requirements:
1. An eye-catching title with an emoji
2. Three to four paragraphs, each with an emoji
3. Highlight the key points and mark keywords
4. Lists are welcome but must be placed outside paragraphs; never nest <ul> inside <p>
5. Inline tags such as <strong> and <span> must not contain block tags such as <p> or <ul>
6. Return strictly the JSON object
7. Every HTML tag must be closed and correctly nested
8. The content must be complete, with no truncated tags or unfinished structure";

pub fn card_user_prompt(topic: &str, keyword: &str) -> String {
    CARD_USER_TEMPLATE
        .replace("{topic}", topic.trim())
        .replace("{keyword}", keyword.trim())
}
