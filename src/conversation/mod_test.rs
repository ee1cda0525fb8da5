use super::*;

#[test]
fn greeting_opens_with_rendered_ai_turn() {
    let conversation = Conversation::new(Some("Hi! How can I help?"));
    assert_eq!(conversation.len(), 1);
    let turn = conversation.turn(0).unwrap();
    assert_eq!(turn.role, Role::Ai);
    assert_eq!(turn.html.as_deref(), Some("<p>Hi! How can I help?</p>\n"));

    assert!(Conversation::new(None).is_empty());
}

#[test]
fn begin_trims_and_gates_on_pending() {
    let mut conversation = Conversation::new(None);

    assert_eq!(conversation.begin("   "), None);
    assert!(conversation.is_empty());

    assert_eq!(conversation.begin("  hello \n"), Some(("hello".to_owned(), 0)));
    assert!(conversation.pending());
    assert_eq!(conversation.turn(0).unwrap(), &Turn::user("hello"));

    assert_eq!(conversation.begin("second"), None, "pending gates input");
    assert_eq!(conversation.len(), 1);

    conversation.finish();
    assert_eq!(conversation.begin("second"), Some(("second".to_owned(), 1)));
}

#[test]
fn append_then_render_tracks_content() {
    let mut conversation = Conversation::new(None);
    let index = conversation.push_ai("");
    conversation.append(index, "1. Travel");
    conversation.append(index, "2. Food");
    assert_eq!(conversation.turn(index).unwrap().html, None);

    let turn = conversation.render(index).unwrap();
    assert_eq!(turn.content, "1. Travel2. Food");
    assert_eq!(turn.html.as_deref(), Some(markdown::to_html("1. Travel2. Food").as_str()));
}

#[test]
fn out_of_range_index_is_ignored() {
    let mut conversation = Conversation::new(None);
    conversation.append(3, "x");
    assert!(conversation.render(3).is_none());
}

#[test]
fn session_is_assigned_once() {
    let mut conversation = Conversation::new(None);
    assert!(!conversation.adopt_session("  "));
    assert_eq!(conversation.session_id(), None);

    assert!(conversation.adopt_session("s-1"));
    assert!(!conversation.adopt_session("s-2"));
    assert_eq!(conversation.session_id(), Some("s-1"));
}

#[test]
fn role_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&Role::Ai).unwrap(), "\"ai\"");
    assert_eq!(Role::User.as_str(), "user");
}
