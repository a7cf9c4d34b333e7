use chrono::Utc;
use roster_portal::models::{
    Account, AccountView, Attachment, CreateAccountRequest, CreatePostRequest, Post, PostView,
    Role, UpdateAccountRequest, normalize_email,
};
use uuid::Uuid;

// --- Test Utilities ---

fn attachment() -> Attachment {
    Attachment {
        url: "https://media.example.com/bucket/users/abc-cv.pdf".to_string(),
        public_id: "users/abc-cv.pdf".to_string(),
        filename: "cv.pdf".to_string(),
        uploaded_at: Utc::now(),
    }
}

fn account(file: Option<Attachment>) -> Account {
    let id = Uuid::new_v4();
    Account {
        id,
        name: "Ada".to_string(),
        email: "ada@example.com".to_string(),
        role: Role::Admin,
        owner_id: id,
        phone: String::new(),
        address: String::new(),
        file,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

// --- Views ---

#[test]
fn test_account_view_never_exposes_media_identifiers() {
    let view = AccountView::from(&account(Some(attachment())));
    let json_output = serde_json::to_string(&view).unwrap();

    assert!(json_output.contains(r#""has_file":true"#));
    assert!(json_output.contains(r#""filename":"cv.pdf""#));
    assert!(!json_output.contains("media.example.com"));
    assert!(!json_output.contains("users/abc-cv.pdf"));
    assert!(!json_output.contains("password"));
}

#[test]
fn test_account_view_without_file() {
    let view = AccountView::from(&account(None));
    let json = serde_json::to_value(&view).unwrap();

    assert_eq!(json["has_file"], false);
    assert!(json["file"].is_null());
    assert_eq!(json["role"], "admin");
}

#[test]
fn test_post_view_mirrors_publication_state() {
    let post = Post {
        id: Uuid::new_v4(),
        title: "Draft".to_string(),
        content: "Soon".to_string(),
        author_id: Uuid::new_v4(),
        author_name: "Ada".to_string(),
        file: Some(attachment()),
        is_published: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let json = serde_json::to_value(PostView::from(&post)).unwrap();

    assert_eq!(json["is_published"], false);
    assert_eq!(json["author_name"], "Ada");
    assert_eq!(json["has_file"], true);
    assert!(json["file"].get("url").is_none());
}

// --- Roles ---

#[test]
fn test_role_round_trips_through_text() {
    assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
    assert_eq!("user".parse::<Role>().unwrap(), Role::User);
    assert!("superuser".parse::<Role>().is_err());
    assert_eq!(serde_json::to_string(&Role::User).unwrap(), r#""user""#);
}

// --- Request Validation ---

#[test]
fn test_create_account_request_validation() {
    let valid = CreateAccountRequest {
        name: "Ada".to_string(),
        email: "ada@example.com".to_string(),
        password: "secret1".to_string(),
        phone: None,
        address: None,
    };
    assert!(valid.validate().is_ok());

    let short = CreateAccountRequest {
        password: "12345".to_string(),
        ..valid.clone()
    };
    assert_eq!(
        short.validate().unwrap_err().to_string(),
        "Password must be at least 6 characters"
    );

    for email in ["plain", "@example.com", "a@b", "a@.com", "a b@example.com"] {
        let bad = CreateAccountRequest {
            email: email.to_string(),
            ..valid.clone()
        };
        assert_eq!(
            bad.validate().unwrap_err().to_string(),
            "Invalid email address",
            "{}",
            email
        );
    }
}

#[test]
fn test_update_account_request_optionality() {
    // Every field is optional; an empty update is valid.
    assert!(UpdateAccountRequest::default().validate().is_ok());

    let partial_update = UpdateAccountRequest {
        name: Some("New Name Only".to_string()),
        ..UpdateAccountRequest::default()
    };

    let json_output = serde_json::to_string(&partial_update).unwrap();
    assert!(json_output.contains(r#""name":"New Name Only""#));
    assert!(!json_output.contains("password")); // None fields are omitted
}

#[test]
fn test_create_post_request_requires_title_and_content() {
    let missing = CreatePostRequest {
        title: "Title".to_string(),
        content: "  ".to_string(),
        is_published: None,
    };

    assert_eq!(
        missing.validate().unwrap_err().to_string(),
        "Title and content are required"
    );
}

#[test]
fn test_normalize_email() {
    assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
}
