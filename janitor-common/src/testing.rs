//! An in-memory orchestration API for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ecs::{EcsClient, EcsError, Page, TaskInfo};

type ScriptedPage = Result<Vec<String>, &'static str>;

#[derive(Default)]
pub struct FakeEcs {
    task_pages: Mutex<VecDeque<ScriptedPage>>,
    scripted_task_pages: bool,
    family_pages: Mutex<VecDeque<ScriptedPage>>,
    family_tasks: HashMap<String, Vec<String>>,
    tasks: Vec<TaskInfo>,
    failing_describes: HashSet<String>,
    failing_stops: HashSet<String>,

    calls: Mutex<Calls>,
}

#[derive(Default)]
struct Calls {
    list_tasks: Vec<(Option<String>, Option<String>)>,
    list_families: usize,
    describe_batches: Vec<usize>,
    stops: Vec<(Option<String>, String, String)>,
}

impl FakeEcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripted ListTasks pages for cluster-wide listings, served in order.
    pub fn with_task_pages(mut self, pages: Vec<ScriptedPage>) -> Self {
        self.task_pages = Mutex::new(pages.into());
        self.scripted_task_pages = true;
        self
    }

    /// Scripted ListTaskDefinitionFamilies pages, served in order.
    pub fn with_family_pages(mut self, pages: Vec<ScriptedPage>) -> Self {
        self.family_pages = Mutex::new(pages.into());
        self
    }

    /// Tasks known to DescribeTasks. Unless pages were scripted, a cluster-wide
    /// ListTasks returns all of them in a single page.
    pub fn with_tasks(mut self, tasks: Vec<TaskInfo>) -> Self {
        self.tasks = tasks;
        self
    }

    /// The running task ARNs ListTasks returns when filtered by `family`.
    pub fn with_family_tasks(mut self, family: &str, arns: Vec<String>) -> Self {
        self.family_tasks.insert(family.to_owned(), arns);
        self
    }

    pub fn failing_describe_for(mut self, arn: &str) -> Self {
        self.failing_describes.insert(arn.to_owned());
        self
    }

    pub fn failing_stop_for(mut self, arn: &str) -> Self {
        self.failing_stops.insert(arn.to_owned());
        self
    }

    pub fn list_task_tokens(&self) -> Vec<Option<String>> {
        let calls = self.calls.lock().unwrap();
        calls.list_tasks.iter().map(|(_, token)| token.clone()).collect()
    }

    pub fn list_task_families(&self) -> Vec<Option<String>> {
        let calls = self.calls.lock().unwrap();
        calls.list_tasks.iter().map(|(family, _)| family.clone()).collect()
    }

    pub fn list_family_calls(&self) -> usize {
        self.calls.lock().unwrap().list_families
    }

    pub fn describe_batches(&self) -> Vec<usize> {
        self.calls.lock().unwrap().describe_batches.clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        let calls = self.calls.lock().unwrap();
        calls.stops.iter().map(|(_, arn, _)| arn.clone()).collect()
    }

    pub fn stop_calls(&self) -> Vec<(Option<String>, String, String)> {
        self.calls.lock().unwrap().stops.clone()
    }

    fn serve(
        queue: &Mutex<VecDeque<ScriptedPage>>,
        served: usize,
        operation: &'static str,
    ) -> Result<Page<String>, EcsError> {
        let mut queue = queue.lock().unwrap();
        match queue.pop_front() {
            Some(Ok(items)) if queue.is_empty() => Ok(Page::last(items)),
            Some(Ok(items)) => Ok(Page::with_token(items, format!("token-{}", served))),
            Some(Err(message)) => Err(EcsError::api(operation, message)),
            None => Ok(Page::last(Vec::new())),
        }
    }
}

#[async_trait]
impl EcsClient for FakeEcs {
    async fn list_tasks(
        &self,
        _cluster: Option<&str>,
        family: Option<&str>,
        next_token: Option<String>,
    ) -> Result<Page<String>, EcsError> {
        let served = {
            let mut calls = self.calls.lock().unwrap();
            calls.list_tasks.push((family.map(str::to_owned), next_token));
            calls.list_tasks.len()
        };

        if let Some(family) = family {
            let arns = self.family_tasks.get(family).cloned().unwrap_or_default();
            return Ok(Page::last(arns));
        }

        if !self.scripted_task_pages {
            let arns = self.tasks.iter().map(|task| task.arn.clone()).collect();
            return Ok(Page::last(arns));
        }

        Self::serve(&self.task_pages, served, "ListTasks")
    }

    async fn list_task_definition_families(
        &self,
        _family_prefix: &str,
        _next_token: Option<String>,
    ) -> Result<Page<String>, EcsError> {
        let served = {
            let mut calls = self.calls.lock().unwrap();
            calls.list_families += 1;
            calls.list_families
        };

        Self::serve(&self.family_pages, served, "ListTaskDefinitionFamilies")
    }

    async fn describe_tasks(
        &self,
        _cluster: Option<&str>,
        task_arns: &[String],
    ) -> Result<Vec<TaskInfo>, EcsError> {
        self.calls
            .lock()
            .unwrap()
            .describe_batches
            .push(task_arns.len());

        if task_arns
            .iter()
            .any(|arn| self.failing_describes.contains(arn))
        {
            return Err(EcsError::api("DescribeTasks", "service unavailable"));
        }

        Ok(task_arns
            .iter()
            .filter_map(|arn| self.tasks.iter().find(|task| &task.arn == arn).cloned())
            .collect())
    }

    async fn stop_task(
        &self,
        cluster: Option<&str>,
        task_arn: &str,
        reason: &str,
    ) -> Result<(), EcsError> {
        self.calls.lock().unwrap().stops.push((
            cluster.map(str::to_owned),
            task_arn.to_owned(),
            reason.to_owned(),
        ));

        if self.failing_stops.contains(task_arn) {
            return Err(EcsError::api("StopTask", "access denied"));
        }
        Ok(())
    }
}
