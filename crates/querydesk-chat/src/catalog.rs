/// Semantic models and search services offered by the backend, and which of
/// them the user selected for the next question. Selections start empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Catalog {
    models: Vec<String>,
    search_services: Vec<String>,
    selected_models: Vec<String>,
    selected_search_services: Vec<String>,
}

impl Catalog {
    pub fn new(models: Vec<String>, search_services: Vec<String>) -> Self {
        Self {
            models,
            search_services,
            ..Self::default()
        }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn search_services(&self) -> &[String] {
        &self.search_services
    }

    pub fn selected_models(&self) -> &[String] {
        &self.selected_models
    }

    pub fn selected_search_services(&self) -> &[String] {
        &self.selected_search_services
    }

    /// Flip a model's selection. `None` if the backend did not offer it.
    pub fn toggle_model(&mut self, name: &str) -> Option<bool> {
        toggle(&self.models, &mut self.selected_models, name)
    }

    pub fn toggle_search_service(&mut self, name: &str) -> Option<bool> {
        toggle(&self.search_services, &mut self.selected_search_services, name)
    }

    /// Replace the offered identifiers, keeping selections that still exist.
    pub fn refresh(&mut self, models: Vec<String>, search_services: Vec<String>) {
        self.selected_models.retain(|m| models.contains(m));
        self.selected_search_services.retain(|s| search_services.contains(s));
        self.models = models;
        self.search_services = search_services;
    }
}

fn toggle(offered: &[String], selected: &mut Vec<String>, name: &str) -> Option<bool> {
    if !offered.iter().any(|o| o == name) {
        return None;
    }
    if let Some(pos) = selected.iter().position(|s| s == name) {
        selected.remove(pos);
        Some(false)
    } else {
        selected.push(name.to_string());
        Some(true)
    }
}
