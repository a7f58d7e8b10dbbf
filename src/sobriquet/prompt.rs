// src/sobriquet/prompt.rs

use std::collections::HashMap;

/// Build the analysis prompt asking the model whether the conversation maps a
/// known user id to a nickname, and to answer in the fixed JSON shape the
/// interpreter expects.
pub fn build_mapping_prompt(
    transcript: &str,
    bot_reply: &str,
    display_names: &HashMap<String, String>,
) -> String {
    let mut known_users: Vec<String> = display_names
        .iter()
        .filter(|(id, name)| !id.is_empty() && !name.is_empty())
        .map(|(id, name)| format!("- {id}: {name}"))
        .collect();
    known_users.sort();
    let user_list = if known_users.is_empty() {
        "none".to_string()
    } else {
        known_users.join("\n")
    };

    format!(
        r#"Task: carefully read the chat history and "your latest reply" below and decide whether they clearly mention a nickname for a user that can be tied, without ambiguity, to one specific user id.

Known users (id: name):
{user_list}

Chat history:
---
{transcript}
---

Your latest reply:
{bot_reply}

Requirements and output format:
1. Find words in the chat history and "your latest reply" that could be a user's nickname.
2. Only keep a nickname when the context ties it clearly and unambiguously to exactly one id in the known-users list. It must be a strong association; do not guess.
3. Do NOT map nicknames for yourself (the user whose name ends with "(self)").
   Do NOT output a word that is identical to the user's known name.
   Do NOT map forms of address you used toward others in "your latest reply" (only analyze what other people call a user in the chat history).
   Do NOT output vague or generic words (such as "buddy", "bro", "that guy") unless the context points to one specific user beyond doubt.
4. If at least one mapping satisfies every condition above, output this JSON object:
        ```json
        {{
            "is_exist": true,
            "data": {{
                "user id A": "nickname A",
                "user id B": "nickname B"
            }}
        }}
        ```
        - Keys of "data" must be user ids as strings, values the nicknames as strings.
        - Include only entries you are fully certain about. Fewer is better.
   If no mapping qualifies, output:
        ```json
        {{
            "is_exist": false
        }}
        ```
5. Output ONLY the JSON object, with no extra explanation or text outside the code fence.

Output:
"#
    )
}
