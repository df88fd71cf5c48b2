mod form;
mod incidence;
mod options;
mod parallel;
mod sparsity;
