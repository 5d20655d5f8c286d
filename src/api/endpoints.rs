//! Typed wrappers for the backend endpoints.

use serde_json::Value;
use tracing::info;

use super::client::ApiClient;
use super::refresh::REFRESH_PATH;
use super::types::{
  ChatRequest, ChatResponse, CourseDto, ExpenseDto, ExpenseSearch, LoginRequest, LoginResponse,
  NewExpense, NewTask, Page, RefreshRequest, RefreshResponse, RegisterRequest, TaskDto,
  TaskSearch, UserProfile,
};
use crate::error::ClientError;
use crate::session::Session;

/// Shown when the chat endpoint answers without text.
pub const EMPTY_CHAT_REPLY: &str = "(no reply)";

/// Fields of the registration form.
#[derive(Debug, Clone)]
pub struct Registration {
  pub user_name: String,
  pub email: String,
  pub password: String,
  pub re_password: String,
}

fn encode_segment(segment: &str) -> String {
  url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

impl ApiClient {
  /// Sign in and persist the new session.
  ///
  /// Older backends answer with a bare `token`, which is a refresh token; the
  /// access token is then minted through the refresh endpoint.
  pub async fn login(&self, user_name: &str, password: &str) -> Result<Session, ClientError> {
    let user_name = user_name.trim();
    let password = password.trim();
    if user_name.is_empty() || password.is_empty() {
      return Err(ClientError::InvalidInput(
        "Please enter both username and password".to_string(),
      ));
    }

    let response: Option<LoginResponse> = self
      .post("/users/login", &LoginRequest { user_name, password })
      .await?;
    let response = response.unwrap_or_default();

    let mut refresh_token = response
      .token
      .or(response.refresh_token)
      .filter(|t| !t.is_empty())
      .ok_or(ClientError::MissingToken("refresh token"))?;

    let access_token = match response.access_token.filter(|t| !t.is_empty()) {
      Some(token) => token,
      None => {
        let exchanged: Option<RefreshResponse> = self
          .post(
            REFRESH_PATH,
            &RefreshRequest {
              refresh_token: &refresh_token,
            },
          )
          .await?;
        let exchanged = exchanged.unwrap_or_default();
        if let Some(rotated) = exchanged.refresh_token.filter(|t| !t.is_empty()) {
          refresh_token = rotated;
        }
        exchanged
          .access_token
          .filter(|t| !t.is_empty())
          .ok_or(ClientError::MissingToken("access token"))?
      }
    };

    self
      .tokens()
      .start(&access_token, &refresh_token, response.user.as_ref())?;
    info!(user = user_name, "signed in");
    Ok(self.tokens().snapshot())
  }

  /// Create an account. The returned profile, if any, is cached.
  pub async fn register(&self, form: &Registration) -> Result<Option<UserProfile>, ClientError> {
    let user_name = form.user_name.trim();
    let email = form.email.trim();
    if user_name.is_empty() || email.is_empty() || form.password.is_empty() {
      return Err(ClientError::InvalidInput(
        "Username, email and password are required".to_string(),
      ));
    }
    if form.password != form.re_password {
      return Err(ClientError::InvalidInput("Passwords do not match".to_string()));
    }

    let body: Value = self
      .post(
        "/users/register",
        &RegisterRequest {
          user_name,
          email,
          password: &form.password,
          re_password: &form.re_password,
        },
      )
      .await?;

    let user = match body {
      Value::Object(_) => serde_json::from_value::<UserProfile>(body).ok(),
      _ => None,
    }
    .filter(|u| u.user_name.is_some() || u.email.is_some());

    if let Some(user) = &user {
      self.tokens().set_user(user)?;
    }
    info!(user = user_name, "registered");
    Ok(user)
  }

  /// Drop the local session.
  pub fn logout(&self) {
    self.tokens().clear("signed out");
  }

  /// Fetch the signed-in user's profile and refresh the cached copy.
  pub async fn profile(&self) -> Result<UserProfile, ClientError> {
    let profile: UserProfile = self.get("/users/profile").await?;
    self.tokens().set_user(&profile)?;
    Ok(profile)
  }

  /// Ask the study assistant.
  pub async fn chat(&self, message: &str) -> Result<String, ClientError> {
    let message = message.trim();
    if message.is_empty() {
      return Err(ClientError::InvalidInput("Message is empty".to_string()));
    }

    let response: Option<ChatResponse> = self.post("/chat", &ChatRequest { message }).await?;
    let response = response.unwrap_or_default();
    Ok(
      response
        .reply
        .or(response.response)
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| EMPTY_CHAT_REPLY.to_string()),
    )
  }

  // Tasks

  pub async fn search_tasks(&self, page_index: u64, page_size: u64) -> Result<Page<TaskDto>, ClientError> {
    let page_size = page_size.max(1);
    let body: Value = self
      .post(
        "/tasks/search",
        &TaskSearch {
          page_index,
          page_size,
        },
      )
      .await?;
    Ok(Page::from_list_or_page(body, page_index, page_size)?)
  }

  pub async fn add_task(&self, task: &NewTask) -> Result<TaskDto, ClientError> {
    self.post("/tasks/add", task).await
  }

  pub async fn delete_task(&self, id: &str) -> Result<(), ClientError> {
    let _: Value = self
      .delete(&format!("/tasks/delete/{}", encode_segment(id)))
      .await?;
    Ok(())
  }

  // Expenses

  pub async fn search_expenses(&self, search: &ExpenseSearch) -> Result<Page<ExpenseDto>, ClientError> {
    let body: Value = self.post("/expenses/search", search).await?;
    Ok(Page::from_list_or_page(
      body,
      search.page_index,
      search.page_size,
    )?)
  }

  pub async fn add_expense(&self, expense: &NewExpense) -> Result<ExpenseDto, ClientError> {
    self.post("/expenses/add", expense).await
  }

  pub async fn delete_expense(&self, id: &str) -> Result<(), ClientError> {
    let _: Value = self
      .delete(&format!("/expenses/delete/{}", encode_segment(id)))
      .await?;
    Ok(())
  }

  // Courses

  pub async fn my_courses(&self) -> Result<Vec<CourseDto>, ClientError> {
    let body: Value = self.get("/courses/my-courses").await?;
    match body {
      Value::Array(_) => Ok(serde_json::from_value(body)?),
      _ => Ok(Vec::new()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::{ExpenseCategory, TaskPriority, TaskStatus};
  use crate::session::SessionKey;
  use crate::test_support::{api_client, memory_tokens_with_bus};
  use serde_json::json;
  use wiremock::matchers::{body_json, header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  #[tokio::test]
  async fn test_login_with_full_token_pair() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/users/login"))
      .and(body_json(json!({"userName": "linh", "password": "secret"})))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "data": {
          "accessToken": "at",
          "refreshToken": "rt",
          "userDTO": {"userName": "linh", "email": "linh@example.com"}
        }
      })))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(path("/api/users/refresh"))
      .respond_with(ResponseTemplate::new(200))
      .expect(0)
      .mount(&server)
      .await;

    let (tokens, _) = memory_tokens_with_bus();
    let client = api_client(&server, &tokens);

    let session = client.login("  linh ", "secret").await.unwrap();

    assert_eq!(session.access_token.as_deref(), Some("at"));
    assert_eq!(session.refresh_token.as_deref(), Some("rt"));
    assert_eq!(
      session.user.unwrap().email.as_deref(),
      Some("linh@example.com")
    );
  }

  #[tokio::test]
  async fn test_login_legacy_token_is_exchanged() {
    let server = MockServer::start().await;
    Mock::given(path("/api/users/login"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "rt-legacy"})))
      .mount(&server)
      .await;
    Mock::given(path("/api/users/refresh"))
      .and(body_json(json!({"refreshToken": "rt-legacy"})))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "at-minted"})))
      .expect(1)
      .mount(&server)
      .await;

    let (tokens, _) = memory_tokens_with_bus();
    let client = api_client(&server, &tokens);

    client.login("linh", "secret").await.unwrap();

    assert_eq!(tokens.access_token().as_deref(), Some("at-minted"));
    assert_eq!(tokens.refresh_token().as_deref(), Some("rt-legacy"));
    assert_eq!(tokens.user(), None);
  }

  #[tokio::test]
  async fn test_login_validation_and_rejection() {
    let server = MockServer::start().await;
    Mock::given(path("/api/users/login"))
      .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})))
      .expect(1)
      .mount(&server)
      .await;

    let (tokens, _) = memory_tokens_with_bus();
    let client = api_client(&server, &tokens);

    assert!(matches!(
      client.login("  ", "secret").await.unwrap_err(),
      ClientError::InvalidInput(_)
    ));
    let err = client.login("linh", "wrong").await.unwrap_err();
    assert_eq!(err.to_string(), "Bad credentials");
    assert_eq!(tokens.snapshot(), Session::default());
  }

  #[tokio::test]
  async fn test_login_without_any_token_fails() {
    let server = MockServer::start().await;
    Mock::given(path("/api/users/login"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"userDTO": {"userName": "linh"}})))
      .mount(&server)
      .await;

    let (tokens, _) = memory_tokens_with_bus();
    let client = api_client(&server, &tokens);

    assert!(matches!(
      client.login("linh", "secret").await.unwrap_err(),
      ClientError::MissingToken("refresh token")
    ));
  }

  #[tokio::test]
  async fn test_register_checks_passwords_and_caches_profile() {
    let server = MockServer::start().await;
    Mock::given(path("/api/users/register"))
      .and(body_json(json!({
        "userName": "an",
        "email": "an@example.com",
        "password": "pw",
        "rePassword": "pw"
      })))
      .respond_with(
        ResponseTemplate::new(200).set_body_json(json!({"data": {"userName": "an", "email": "an@example.com"}})),
      )
      .expect(1)
      .mount(&server)
      .await;

    let (tokens, _) = memory_tokens_with_bus();
    let client = api_client(&server, &tokens);

    let mut form = Registration {
      user_name: "an".to_string(),
      email: "an@example.com".to_string(),
      password: "pw".to_string(),
      re_password: "other".to_string(),
    };
    assert!(matches!(
      client.register(&form).await.unwrap_err(),
      ClientError::InvalidInput(_)
    ));

    form.re_password = "pw".to_string();
    let user = client.register(&form).await.unwrap().unwrap();
    assert_eq!(user.user_name.as_deref(), Some("an"));
    assert_eq!(tokens.user(), Some(user));
    assert_eq!(tokens.access_token(), None);
  }

  #[tokio::test]
  async fn test_chat_reply_fallbacks() {
    let server = MockServer::start().await;
    Mock::given(path("/api/chat"))
      .and(body_json(json!({"message": "hello"})))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "hi there"})))
      .up_to_n_times(1)
      .mount(&server)
      .await;
    Mock::given(path("/api/chat"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
      .mount(&server)
      .await;

    let (tokens, _) = memory_tokens_with_bus();
    tokens.set(SessionKey::AccessToken, "at").unwrap();
    let client = api_client(&server, &tokens);

    assert_eq!(client.chat("hello").await.unwrap(), "hi there");
    assert_eq!(client.chat("again").await.unwrap(), EMPTY_CHAT_REPLY);
  }

  #[tokio::test]
  async fn test_search_tasks_accepts_bare_list() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/tasks/search"))
      .and(header("Authorization", "Bearer at"))
      .and(body_json(json!({"pageIndex": 0, "pageSize": 100})))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "data": [{
          "id": "t1",
          "title": "Essay",
          "deadline": "2025-10-08T23:59:00",
          "status": "IN_PROGRESS",
          "priority": "URGENT"
        }]
      })))
      .mount(&server)
      .await;

    let (tokens, _) = memory_tokens_with_bus();
    tokens.set(SessionKey::AccessToken, "at").unwrap();
    let client = api_client(&server, &tokens);

    let page = client.search_tasks(0, 100).await.unwrap();
    assert_eq!(page.total_elements, 1);
    assert_eq!(page.content[0].status, TaskStatus::InProgress);
    assert_eq!(page.content[0].priority, TaskPriority::Urgent);
  }

  #[tokio::test]
  async fn test_expense_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/expenses/add"))
      .and(body_json(json!({
        "amount": 30000.0,
        "category": "FOOD",
        "description": "Lunch",
        "expenseDate": "2025-10-06T12:00:00",
        "paymentMethod": "CASH"
      })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {
        "id": "e1",
        "amount": 30000,
        "category": "FOOD",
        "description": "Lunch",
        "expenseDate": "2025-10-06T12:00:00",
        "paymentMethod": "CASH"
      }})))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("DELETE"))
      .and(path("/api/expenses/delete/e1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": "deleted"})))
      .expect(1)
      .mount(&server)
      .await;

    let (tokens, _) = memory_tokens_with_bus();
    let client = api_client(&server, &tokens);

    let expense = NewExpense::new(
      30000.0,
      ExpenseCategory::Food,
      Some("Lunch".to_string()),
      "2025-10-06",
      "12:00",
      None,
    );
    let saved = client.add_expense(&expense).await.unwrap();
    assert_eq!(saved.id, "e1");
    assert_eq!(saved.amount, 30000.0);

    client.delete_expense("e1").await.unwrap();
  }

  #[tokio::test]
  async fn test_my_courses_null_is_empty() {
    let server = MockServer::start().await;
    Mock::given(path("/api/courses/my-courses"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": null})))
      .mount(&server)
      .await;

    let (tokens, _) = memory_tokens_with_bus();
    let client = api_client(&server, &tokens);

    assert!(client.my_courses().await.unwrap().is_empty());
  }
}
