use crate::model::SourceRef;

pub fn no_context_reply(product: &str) -> String {
    format!(
        "No relevant information found in the {product} documentation for this question. \
         Try rephrasing it, or create a support ticket so the team can follow up."
    )
}

pub fn template_reply(product: &str, excerpts: &[(SourceRef, bool)]) -> String {
    let mut reply = format!("Here's what the {product} documentation says:");
    for (source, truncated) in excerpts {
        reply.push_str("\n\n");
        reply.push_str(source.text.trim_end());
        if *truncated {
            reply.push_str("...");
        }
    }
    reply
}
