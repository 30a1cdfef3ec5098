#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Kernel {
	Auto,
	Scalar,
	ScalarBatch,
}

impl Default for Kernel {
	fn default() -> Self {
		Kernel::Auto
	}
}

impl Kernel {
	#[inline(always)]
	pub const fn is_batch(self) -> bool {
		matches!(self, Kernel::ScalarBatch)
	}
}
