//! Property-based tests for bridge message classification.

use adslot::bridge::{
    classify, forwarder_script, unit_hooks_script, BridgeAction, BridgeMessage, DATA_TAG,
    REDIRECT_TAG,
};
use adslot::UnitId;
use proptest::prelude::*;

const TAGS: [&str; 5] = [
    "callback",
    "alternative",
    "data-callback",
    "data-callback-url-click",
    "data-callback-url-view",
];

proptest! {
    /// Messages that are neither a redirect nor end in a tag never act.
    #[test]
    fn prop_unknown_messages_are_dropped(body in "[a-z0-9 ]{0,24}(\\|[a-z0-9 ]{0,12}){0,3}") {
        let message = BridgeMessage::parse(&body);
        let tagged = message.is_some_and(|m| m.first == REDIRECT_TAG || TAGS.contains(&m.last));
        prop_assume!(!tagged);
        prop_assert!(classify(&body).is_empty());
    }

    /// Only the last segment decides the callback; everything before it is ignored.
    #[test]
    fn prop_prefix_does_not_change_callback(
        prefix in "[a-z0-9:/. ]{0,16}(\\|[a-z0-9 ]{0,8}){0,3}",
        tag_idx in 0..TAGS.len()
    ) {
        prop_assume!(!prefix.starts_with(REDIRECT_TAG));
        let tag = TAGS[tag_idx];
        let body = format!("{prefix}|{tag}");
        prop_assert_eq!(classify(&body), classify(tag));
        prop_assert_eq!(classify(tag).len(), 1);
    }

    /// A redirect to an https URL always yields exactly that URL.
    #[test]
    fn prop_redirect_targets_last_segment(
        host in "[a-z]{1,10}\\.(test|example)",
        path in "[a-z0-9]{0,10}"
    ) {
        let target = format!("https://{host}/{path}");
        let actions = classify(&format!("{REDIRECT_TAG}|ignored|{target}"));
        prop_assert_eq!(actions.len(), 1);
        match &actions[0] {
            BridgeAction::Redirect(url) => prop_assert_eq!(url.as_str(), target.as_str()),
            other => prop_assert!(false, "unexpected action {:?}", other),
        }
    }

    /// Injected scripts embed the channel and unit verbatim.
    #[test]
    fn prop_scripts_embed_channel_and_unit(
        channel in "[A-Za-z_][A-Za-z0-9_]{0,20}",
        unit in 0u32..1_000_000
    ) {
        let unit_id = UnitId::from(unit);
        let invocation = format!("window.webkit.messageHandlers.{channel}");
        let element = format!("\"clever-{unit}\"");
        prop_assert!(forwarder_script(&channel).contains(&invocation));
        let hooks = unit_hooks_script(&unit_id, &channel);
        prop_assert!(hooks.contains(&invocation));
        prop_assert!(hooks.contains(&element));
        prop_assert!(hooks.contains(DATA_TAG));
    }
}
