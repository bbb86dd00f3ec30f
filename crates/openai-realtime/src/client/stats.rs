/// Token usage accumulated from `response.done` events over one connection.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    total_tokens: u64,
    input_tokens: u64,
    output_tokens: u64,
    responses: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn update_usage(&mut self, total: u64, input: u64, output: u64) {
        self.total_tokens += total;
        self.input_tokens += input;
        self.output_tokens += output;
        self.responses += 1;
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn input_tokens(&self) -> u64 {
        self.input_tokens
    }

    pub fn output_tokens(&self) -> u64 {
        self.output_tokens
    }

    pub fn responses(&self) -> u64 {
        self.responses
    }
}
