mod dispatch;
mod worker;
