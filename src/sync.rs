//! Backend client that keeps the dashboard cache current.
//!
//! Each sync fetches one feature, normalizes it into the cached record shape
//! and saves it. Mutations update the backend first and patch the cache only
//! once the backend accepted them.

use chrono::{Datelike, Local, NaiveDate, Weekday};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::api::types::{
  CourseDto, ExpenseDto, ExpenseSearch, NewExpense, NewTask, TaskDto, TaskPriority, TaskStatus,
};
use crate::api::ApiClient;
use crate::cache::{DashboardCache, ExpenseSummary, ScheduleEntry, TaskSummary};
use crate::error::ClientError;

/// Category for tasks without a local assignment
pub const DEFAULT_TASK_CATEGORY: &str = "other";

const TASK_PAGE_SIZE: u64 = 100;
const EXPENSE_PAGE_SIZE: u64 = 200;

/// Backend client with a write-through dashboard cache.
#[derive(Clone)]
pub struct SyncedClient {
  api: ApiClient,
  cache: DashboardCache,
}

impl SyncedClient {
  pub fn new(api: ApiClient, cache: DashboardCache) -> Self {
    Self { api, cache }
  }

  pub fn api(&self) -> &ApiClient {
    &self.api
  }

  pub fn cache(&self) -> &DashboardCache {
    &self.cache
  }

  /// Cache the courses held on `today`, ordered by start time.
  pub async fn sync_schedule(&self, today: Weekday) -> Result<Vec<ScheduleEntry>, ClientError> {
    let courses = self.api.my_courses().await?;
    let schedule = schedule_for(&courses, today);
    debug!(courses = courses.len(), today = schedule.len(), "schedule synced");
    self.cache.save(schedule.clone());
    Ok(schedule)
  }

  /// Cache every task with its local category, nearest deadline first.
  pub async fn sync_tasks(&self) -> Result<Vec<TaskSummary>, ClientError> {
    let page = self.api.search_tasks(0, TASK_PAGE_SIZE).await?;
    let categories = self.cache.task_categories();
    let tasks = sort_by_deadline(
      page
        .content
        .iter()
        .map(|t| task_summary(t, &categories))
        .collect(),
    );
    debug!(tasks = tasks.len(), "tasks synced");
    self.cache.save(tasks.clone());
    Ok(tasks)
  }

  /// Fetch all of a month's expenses and merge them into the cache.
  pub async fn sync_expenses(&self, year: i32, month: u32) -> Result<Vec<ExpenseDto>, ClientError> {
    let (start, end) = month_range(year, month)
      .ok_or_else(|| ClientError::InvalidInput(format!("invalid month {year}-{month:02}")))?;

    let mut expenses = Vec::new();
    let mut page_index = 0;
    loop {
      let search = ExpenseSearch {
        page_index,
        page_size: EXPENSE_PAGE_SIZE,
        start_date: Some(start.clone()),
        end_date: Some(end.clone()),
        ..Default::default()
      };
      let page = self.api.search_expenses(&search).await?;
      let fetched = page.content.len();
      expenses.extend(page.content);

      page_index += 1;
      if fetched == 0 || page_index >= page.total_pages {
        break;
      }
    }

    debug!(expenses = expenses.len(), %start, %end, "expenses synced");
    self.cache.merge_expenses(expenses.iter().map(ExpenseSummary::from));
    Ok(expenses)
  }

  pub async fn add_expense(&self, expense: &NewExpense) -> Result<ExpenseDto, ClientError> {
    let saved = self.api.add_expense(expense).await?;
    self.cache.merge_expenses([ExpenseSummary::from(&saved)]);
    info!(id = %saved.id, amount = saved.amount, "expense added");
    Ok(saved)
  }

  pub async fn delete_expense(&self, id: &str) -> Result<(), ClientError> {
    self.api.delete_expense(id).await?;
    self.cache.remove_expense(id);
    info!(id, "expense deleted");
    Ok(())
  }

  pub async fn add_task(&self, task: &NewTask, category: Option<&str>) -> Result<TaskDto, ClientError> {
    let saved = self.api.add_task(task).await?;
    if let Some(category) = category {
      self.cache.set_task_category(&saved.id, category);
    }

    let categories = self.cache.task_categories();
    let mut tasks: Vec<TaskSummary> = self.cache.load();
    tasks.push(task_summary(&saved, &categories));
    self.cache.save(sort_by_deadline(tasks));

    info!(id = %saved.id, "task added");
    Ok(saved)
  }

  pub async fn delete_task(&self, id: &str) -> Result<(), ClientError> {
    self.api.delete_task(id).await?;
    self.cache.remove_task_category(id);

    let mut tasks: Vec<TaskSummary> = self.cache.load();
    tasks.retain(|t| t.id.as_deref() != Some(id));
    self.cache.save(tasks);

    info!(id, "task deleted");
    Ok(())
  }

  /// Assign a local category to a task. Categories never reach the backend.
  pub fn set_task_category(&self, id: &str, category: &str) {
    self.cache.set_task_category(id, category);

    let mut tasks: Vec<TaskSummary> = self.cache.load();
    let mut found = false;
    for task in tasks.iter_mut().filter(|t| t.id.as_deref() == Some(id)) {
      task.category = Some(category.to_string());
      found = true;
    }
    if found {
      self.cache.save(tasks);
    }
  }
}

/// Label the backend uses for a weekday in `dayWeek`.
pub fn weekday_label(day: Weekday) -> &'static str {
  const LABELS: [&str; 7] = [
    "Chủ nhật", "Thứ 2", "Thứ 3", "Thứ 4", "Thứ 5", "Thứ 6", "Thứ 7",
  ];
  LABELS[day.num_days_from_sunday() as usize]
}

/// First and last instant of a month as local `YYYY-MM-DDTHH:mm:ss`.
pub fn month_range(year: i32, month: u32) -> Option<(String, String)> {
  let first = NaiveDate::from_ymd_opt(year, month, 1)?;
  let next = if month == 12 {
    NaiveDate::from_ymd_opt(year + 1, 1, 1)?
  } else {
    NaiveDate::from_ymd_opt(year, month + 1, 1)?
  };
  let last = next.pred_opt()?;
  Some((
    format!("{}T00:00:00", first.format("%Y-%m-%d")),
    format!("{}T23:59:59", last.format("%Y-%m-%d")),
  ))
}

fn schedule_for(courses: &[CourseDto], today: Weekday) -> Vec<ScheduleEntry> {
  let label = weekday_label(today);
  let mut schedule: Vec<ScheduleEntry> = courses
    .iter()
    .filter(|c| c.day_week == label)
    .filter_map(|c| {
      let time = c.time_study.as_deref()?.get(11..16)?;
      Some(ScheduleEntry {
        time: time.to_string(),
        subject: c.name_course.clone(),
        room: c.room.clone().unwrap_or_default(),
      })
    })
    .collect();
  schedule.sort_by(|a, b| a.time.cmp(&b.time));
  schedule
}

fn task_summary(task: &TaskDto, categories: &HashMap<String, String>) -> TaskSummary {
  let status = match task.status {
    TaskStatus::Done => "done",
    TaskStatus::InProgress => "doing",
    TaskStatus::Todo | TaskStatus::Cancelled => "todo",
  };
  let priority = match task.priority {
    TaskPriority::Low => "low",
    TaskPriority::High | TaskPriority::Urgent => "high",
    TaskPriority::Medium => "medium",
  };

  TaskSummary {
    id: Some(task.id.clone()),
    title: task.title.clone(),
    deadline: task
      .deadline
      .clone()
      .filter(|d| !d.is_empty())
      .unwrap_or_else(|| Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()),
    category: Some(
      categories
        .get(&task.id)
        .cloned()
        .unwrap_or_else(|| DEFAULT_TASK_CATEGORY.to_string()),
    ),
    priority: Some(priority.to_string()),
    status: Some(status.to_string()),
    subject: None,
    done: None,
  }
}

fn sort_by_deadline(mut tasks: Vec<TaskSummary>) -> Vec<TaskSummary> {
  tasks.sort_by(|a, b| a.deadline.cmp(&b.deadline));
  tasks
}

/// Today's weekday and month in local time.
pub fn local_today() -> (Weekday, i32, u32) {
  let now = Local::now();
  (now.weekday(), now.year(), now.month())
}
