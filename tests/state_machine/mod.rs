mod concurrency;
mod payments;
mod scheduling;
