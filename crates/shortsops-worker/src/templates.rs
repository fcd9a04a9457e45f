//! Niche script templates.

use shortsops_models::ScriptParts;

struct Template {
    hook: &'static str,
    body: &'static str,
    cta: &'static str,
}

const FITNESS: Template = Template {
    hook: "Want to get fit in just {minutes} minutes a day?",
    body: "Here are {number} proven exercises that actually work. No equipment needed!",
    cta: "Follow for more fitness tips!",
};

const CRYPTO: Template = Template {
    hook: "Did you know {fact}?",
    body: "Let me explain why this matters for your crypto portfolio in simple terms.",
    cta: "Hit follow to stay updated on crypto trends!",
};

const DEFAULT: Template = Template {
    hook: "Here's something you need to know about {topic}",
    body: "This simple trick will change everything. Pay attention!",
    cta: "Follow for more valuable tips!",
};

fn template_for(niche: &str) -> &'static Template {
    match niche.to_lowercase().as_str() {
        "fitness" => &FITNESS,
        "crypto" => &CRYPTO,
        _ => &DEFAULT,
    }
}

fn substitute(text: &str, niche: &str) -> String {
    text.replace("{minutes}", "5")
        .replace("{number}", "3")
        .replace("{fact}", "Bitcoin uses less energy than banking")
        .replace("{topic}", niche)
}

/// Script for `niche`. A non-empty `hook` replaces the template hook.
pub fn render_script(niche: &str, hook: Option<&str>) -> ScriptParts {
    let template = template_for(niche);
    let hook = match hook.map(str::trim).filter(|h| !h.is_empty()) {
        Some(seed) => seed.to_string(),
        None => substitute(template.hook, niche),
    };
    ScriptParts::new(hook, substitute(template.body, niche), substitute(template.cta, niche))
}
