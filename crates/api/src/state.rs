use runtime::EngineHandle;

#[derive(Clone, Debug)]
pub struct AppState {
    engine: EngineHandle,
}

impl AppState {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }
}
